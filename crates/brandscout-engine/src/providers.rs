use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::auth::ServiceAccountTokenSource;
use crate::error::{error_chain_text, is_transport_error, truncate_text, GenerationError};

const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DRYRUN_WIDTH: u32 = 1600;

/// What a provider is asked for: one prompt, a sample count and an aspect ratio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockupRequest {
    pub prompt: String,
    pub sample_count: u32,
    pub aspect_ratio: String,
}

#[derive(Debug, Clone)]
pub struct ProviderImage {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
    pub provider: String,
    pub model: String,
}

pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;
    fn generate(&self, request: &MockupRequest) -> Result<ProviderImage, GenerationError>;
}

#[derive(Default)]
pub struct ImageProviderRegistry {
    providers: BTreeMap<String, Arc<dyn ImageProvider>>,
}

impl ImageProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: ImageProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Arc::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ImageProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

/// Offline provider: a flat color derived from the prompt, at the requested ratio.
pub struct DryrunProvider;

impl ImageProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn model(&self) -> &str {
        "dryrun-image-1"
    }

    fn generate(&self, request: &MockupRequest) -> Result<ProviderImage, GenerationError> {
        let (width, height) = dims_for_ratio(&request.aspect_ratio, DRYRUN_WIDTH);
        let (r, g, b) = color_from_prompt(&request.prompt);
        let image = RgbImage::from_pixel(width, height, Rgb([r, g, b]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|err| GenerationError::InvalidResponse {
                message: format!("dryrun encode failed: {err}"),
            })?;
        Ok(ProviderImage {
            bytes,
            mime_type: Some("image/png".to_string()),
            provider: self.name().to_string(),
            model: self.model().to_string(),
        })
    }
}

/// Imagen on Vertex AI, authenticated with a service-account access token.
pub struct VertexImagenProvider {
    api_base: String,
    location: String,
    model: String,
    tokens: ServiceAccountTokenSource,
    http: HttpClient,
}

impl VertexImagenProvider {
    pub fn new(
        tokens: ServiceAccountTokenSource,
        location: &str,
        model: &str,
        api_base: Option<&str>,
        http: HttpClient,
    ) -> Self {
        let location = location.trim().to_string();
        let api_base = api_base
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("https://{location}-aiplatform.googleapis.com"));
        Self {
            api_base,
            location,
            model: resolve_model_name(model),
            tokens,
            http,
        }
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:predict",
            self.api_base,
            self.tokens.project_id(),
            self.location,
            self.model
        )
    }
}

impl ImageProvider for VertexImagenProvider {
    fn name(&self) -> &str {
        "vertex"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn generate(&self, request: &MockupRequest) -> Result<ProviderImage, GenerationError> {
        let token = self
            .tokens
            .access_token()
            .map_err(|err| GenerationError::Auth {
                message: error_chain_text(&err, 512),
            })?;
        let endpoint = self.endpoint();
        tracing::debug!(%endpoint, "requesting Vertex Imagen prediction");
        let builder = self
            .http
            .post(&endpoint)
            .bearer_auth(token)
            .json(&predict_payload(request));
        let payload = send_predict("Vertex Imagen", builder)?;
        let image = first_prediction(&payload)?;
        Ok(ProviderImage {
            bytes: image.bytes,
            mime_type: image.mime_type,
            provider: self.name().to_string(),
            model: self.model.clone(),
        })
    }
}

/// Imagen through the Gemini API, authenticated with an API key.
pub struct GeminiImagenProvider {
    api_base: String,
    api_key: String,
    model: String,
    http: HttpClient,
}

impl GeminiImagenProvider {
    pub fn new(api_key: &str, model: &str, api_base: Option<&str>, http: HttpClient) -> Self {
        Self {
            api_base: api_base
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
            api_key: api_key.trim().to_string(),
            model: resolve_model_name(model),
            http,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/models/{}:predict", self.api_base, self.model)
    }
}

impl ImageProvider for GeminiImagenProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn generate(&self, request: &MockupRequest) -> Result<ProviderImage, GenerationError> {
        let endpoint = self.endpoint();
        tracing::debug!(%endpoint, "requesting Gemini API Imagen prediction");
        let builder = self
            .http
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&predict_payload(request));
        let payload = send_predict("Imagen", builder)?;
        let image = first_prediction(&payload)?;
        Ok(ProviderImage {
            bytes: image.bytes,
            mime_type: image.mime_type,
            provider: self.name().to_string(),
            model: self.model.clone(),
        })
    }
}

#[derive(Debug, Clone)]
struct ImageBytes {
    bytes: Vec<u8>,
    mime_type: Option<String>,
}

fn resolve_model_name(raw_model: &str) -> String {
    let trimmed = raw_model.trim().trim_start_matches("models/").to_string();
    match trimmed.to_ascii_lowercase().as_str() {
        "imagen-3" | "imagen-3.0" => "imagen-3.0-generate-001".to_string(),
        "imagen-4" | "imagen-4.0" => "imagen-4.0-generate-001".to_string(),
        _ => trimmed,
    }
}

fn predict_payload(request: &MockupRequest) -> Value {
    json!({
        "instances": [{
            "prompt": request.prompt,
        }],
        "parameters": {
            "sampleCount": request.sample_count,
            "aspectRatio": request.aspect_ratio,
            "includeRaiReason": true,
        },
    })
}

fn send_predict(provider: &str, builder: RequestBuilder) -> Result<Value, GenerationError> {
    let response = builder.send().map_err(|err| {
        let err = anyhow::Error::new(err);
        let kind = if is_transport_error(&err) {
            "transport"
        } else {
            "request"
        };
        GenerationError::Transport {
            message: format!("{provider} {kind} error: {}", error_chain_text(&err, 512)),
        }
    })?;
    let status = response.status();
    let body = response.text().map_err(|err| GenerationError::Transport {
        message: format!("{provider} response body read failed: {err}"),
    })?;
    if !status.is_success() {
        return Err(GenerationError::Api {
            status: status.as_u16(),
            body: truncate_text(&body, 512),
        });
    }
    serde_json::from_str(&body).map_err(|err| GenerationError::InvalidResponse {
        message: format!("{provider} returned invalid JSON payload: {err}"),
    })
}

fn first_prediction(payload: &Value) -> Result<ImageBytes, GenerationError> {
    let predictions = payload
        .get("predictions")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut filtered_reason: Option<String> = None;
    for row in predictions {
        let Some(obj) = row.as_object() else {
            continue;
        };
        if let Some(image) = image_bytes_from_prediction(obj)? {
            return Ok(image);
        }
        if let Some(reason) = obj
            .get("raiFilteredReason")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            filtered_reason.get_or_insert_with(|| reason.to_string());
        }
    }
    match filtered_reason {
        Some(reason) => Err(GenerationError::Filtered { reason }),
        None => Err(GenerationError::InvalidResponse {
            message: "provider returned no images".to_string(),
        }),
    }
}

fn image_bytes_from_prediction(
    obj: &Map<String, Value>,
) -> Result<Option<ImageBytes>, GenerationError> {
    let nested = obj
        .get("image")
        .and_then(Value::as_object)
        .or_else(|| obj.get("generatedImage").and_then(Value::as_object));
    let (encoded, mime_type) = if let Some(encoded) = obj
        .get("bytesBase64Encoded")
        .or_else(|| obj.get("bytes_base64_encoded"))
        .and_then(Value::as_str)
    {
        (encoded, string_field(obj, &["mimeType", "mime_type"]))
    } else if let Some((encoded, nested)) = nested.and_then(|nested| {
        nested
            .get("imageBytes")
            .or_else(|| nested.get("bytesBase64Encoded"))
            .and_then(Value::as_str)
            .map(|encoded| (encoded, nested))
    }) {
        (encoded, string_field(nested, &["mimeType", "mime_type"]))
    } else {
        return Ok(None);
    };
    let bytes = BASE64
        .decode(encoded.as_bytes())
        .map_err(|err| GenerationError::InvalidResponse {
            message: format!("image base64 decode failed: {err}"),
        })?;
    Ok(Some(ImageBytes { bytes, mime_type }))
}

fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Pixel size for an `W:H` ratio at a fixed width; malformed ratios fall back to square.
fn dims_for_ratio(ratio: &str, width: u32) -> (u32, u32) {
    let parsed = ratio.split_once(':').and_then(|(w, h)| {
        let w = w.trim().parse::<u32>().ok().filter(|value| *value > 0)?;
        let h = h.trim().parse::<u32>().ok().filter(|value| *value > 0)?;
        Some((w, h))
    });
    match parsed {
        Some((w, h)) => (width, (u64::from(width) * u64::from(h) / u64::from(w)).max(1) as u32),
        None => (width, width),
    }
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;
    use serde_json::json;

    use super::{
        dims_for_ratio, first_prediction, predict_payload, resolve_model_name, DryrunProvider,
        GeminiImagenProvider, ImageProvider, ImageProviderRegistry, MockupRequest, BASE64,
    };
    use crate::error::GenerationError;

    fn request(prompt: &str) -> MockupRequest {
        MockupRequest {
            prompt: prompt.to_string(),
            sample_count: 1,
            aspect_ratio: "16:9".to_string(),
        }
    }

    #[test]
    fn predict_payload_requests_one_wide_image() {
        let payload = predict_payload(&request("boat"));
        assert_eq!(payload["instances"][0]["prompt"], json!("boat"));
        assert_eq!(payload["parameters"]["sampleCount"], json!(1));
        assert_eq!(payload["parameters"]["aspectRatio"], json!("16:9"));
    }

    #[test]
    fn first_prediction_decodes_flat_and_nested_shapes() -> anyhow::Result<()> {
        let encoded = BASE64.encode(b"png-bytes");
        let flat = json!({
            "predictions": [{"bytesBase64Encoded": encoded, "mimeType": "image/png"}]
        });
        let image = first_prediction(&flat)?;
        assert_eq!(image.bytes, b"png-bytes");
        assert_eq!(image.mime_type.as_deref(), Some("image/png"));

        let nested = json!({
            "predictions": [{"image": {"imageBytes": BASE64.encode(b"jpeg"), "mimeType": "image/jpeg"}}]
        });
        let image = first_prediction(&nested)?;
        assert_eq!(image.bytes, b"jpeg");
        assert_eq!(image.mime_type.as_deref(), Some("image/jpeg"));
        Ok(())
    }

    #[test]
    fn filtered_predictions_report_policy_reason() {
        let payload = json!({
            "predictions": [{"raiFilteredReason": "Image blocked by safety filter."}]
        });
        let err = first_prediction(&payload).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Filtered { ref reason } if reason == "Image blocked by safety filter."
        ));
    }

    #[test]
    fn missing_predictions_are_invalid_response() {
        let err = first_prediction(&json!({})).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidResponse { .. }));

        let bad = json!({"predictions": [{"bytesBase64Encoded": "***"}]});
        assert!(matches!(
            first_prediction(&bad).unwrap_err(),
            GenerationError::InvalidResponse { .. }
        ));
    }

    #[test]
    fn dims_follow_ratio() {
        assert_eq!(dims_for_ratio("16:9", 1600), (1600, 900));
        assert_eq!(dims_for_ratio("4:3", 1600), (1600, 1200));
        assert_eq!(dims_for_ratio("wide", 1600), (1600, 1600));
        assert_eq!(dims_for_ratio("0:9", 1600), (1600, 1600));
    }

    #[test]
    fn dryrun_provider_produces_decodable_wide_png() -> anyhow::Result<()> {
        let image = DryrunProvider.generate(&request("Minimalist Wine Bar"))?;
        assert_eq!(image.provider, "dryrun");
        let decoded = image::load_from_memory(&image.bytes)?;
        assert_eq!((decoded.width(), decoded.height()), (1600, 900));

        let again = DryrunProvider.generate(&request("Minimalist Wine Bar"))?;
        assert_eq!(image.bytes, again.bytes);
        Ok(())
    }

    #[test]
    fn model_names_are_normalized() {
        assert_eq!(resolve_model_name("models/imagen-3"), "imagen-3.0-generate-001");
        assert_eq!(
            resolve_model_name(" imagen-3.0-fast-generate-001 "),
            "imagen-3.0-fast-generate-001"
        );
    }

    #[test]
    fn gemini_endpoint_uses_override_base() {
        let provider = GeminiImagenProvider::new(
            "key",
            "imagen-3.0-generate-002",
            Some("http://127.0.0.1:9/v1beta/"),
            reqwest::blocking::Client::new(),
        );
        assert_eq!(
            provider.endpoint(),
            "http://127.0.0.1:9/v1beta/models/imagen-3.0-generate-002:predict"
        );
    }

    #[test]
    fn registry_lists_and_returns_providers() {
        let mut registry = ImageProviderRegistry::new();
        registry.register(DryrunProvider);
        assert_eq!(registry.names(), vec!["dryrun".to_string()]);
        assert!(registry.get("dryrun").is_some());
        assert!(registry.get("vertex").is_none());
    }
}
