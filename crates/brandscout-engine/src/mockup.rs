use image::DynamicImage;

use brandscout_contracts::design::BrandQuery;

use crate::error::GenerationError;
use crate::providers::{ImageProvider, MockupRequest};

pub const MOCKUP_ASPECT_RATIO: &str = "16:9";
pub const MOCKUP_SAMPLE_COUNT: u32 = 1;

pub fn mockup_prompt(query: &BrandQuery) -> String {
    format!(
        "Award-winning product photography of {query}. The product features a logo centered on the packaging. Cinematic lighting, 8k resolution, highly detailed, photorealistic."
    )
}

pub fn mockup_request(query: &BrandQuery) -> MockupRequest {
    MockupRequest {
        prompt: mockup_prompt(query),
        sample_count: MOCKUP_SAMPLE_COUNT,
        aspect_ratio: MOCKUP_ASPECT_RATIO.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedBackground {
    pub image: DynamicImage,
    pub provider: String,
    pub model: String,
}

impl GeneratedBackground {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }
}

/// Either a decoded background or the reason there is none.
#[derive(Debug)]
pub enum GenerationOutcome {
    Generated(GeneratedBackground),
    NoImage(GenerationError),
}

impl GenerationOutcome {
    pub fn background(&self) -> Option<&GeneratedBackground> {
        match self {
            Self::Generated(background) => Some(background),
            Self::NoImage(_) => None,
        }
    }
}

pub fn generate_mockup(provider: &dyn ImageProvider, query: &BrandQuery) -> GenerationOutcome {
    let request = mockup_request(query);
    let image = match provider.generate(&request) {
        Ok(image) => image,
        Err(err) => {
            tracing::warn!(provider = provider.name(), error = %err, "mockup generation failed");
            return GenerationOutcome::NoImage(err);
        }
    };
    match image::load_from_memory(&image.bytes) {
        Ok(decoded) => {
            tracing::debug!(
                provider = %image.provider,
                model = %image.model,
                width = decoded.width(),
                height = decoded.height(),
                "mockup background decoded"
            );
            GenerationOutcome::Generated(GeneratedBackground {
                image: decoded,
                provider: image.provider,
                model: image.model,
            })
        }
        Err(err) => {
            let err = GenerationError::InvalidResponse {
                message: format!(
                    "generated image could not be decoded ({}): {err}",
                    image.mime_type.as_deref().unwrap_or("unknown type")
                ),
            };
            tracing::warn!(provider = provider.name(), error = %err, "mockup generation failed");
            GenerationOutcome::NoImage(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use brandscout_contracts::design::BrandQuery;

    use super::{generate_mockup, mockup_prompt, mockup_request, GenerationOutcome};
    use crate::error::GenerationError;
    use crate::providers::{DryrunProvider, ImageProvider, MockupRequest, ProviderImage};

    struct GarbageProvider;

    impl ImageProvider for GarbageProvider {
        fn name(&self) -> &str {
            "garbage"
        }

        fn model(&self) -> &str {
            "garbage-1"
        }

        fn generate(&self, _request: &MockupRequest) -> Result<ProviderImage, GenerationError> {
            Ok(ProviderImage {
                bytes: b"definitely not an image".to_vec(),
                mime_type: Some("image/png".to_string()),
                provider: "garbage".to_string(),
                model: "garbage-1".to_string(),
            })
        }
    }

    struct RefusingProvider;

    impl ImageProvider for RefusingProvider {
        fn name(&self) -> &str {
            "refusing"
        }

        fn model(&self) -> &str {
            "refusing-1"
        }

        fn generate(&self, _request: &MockupRequest) -> Result<ProviderImage, GenerationError> {
            Err(GenerationError::Filtered {
                reason: "blocked".to_string(),
            })
        }
    }

    #[test]
    fn prompt_embeds_vibe_verbatim() {
        let query = BrandQuery::parse("Minimalist Wine Bar").unwrap();
        assert_eq!(
            mockup_prompt(&query),
            "Award-winning product photography of Minimalist Wine Bar. The product features a logo centered on the packaging. Cinematic lighting, 8k resolution, highly detailed, photorealistic."
        );
        let request = mockup_request(&query);
        assert_eq!(request.sample_count, 1);
        assert_eq!(request.aspect_ratio, "16:9");
    }

    #[test]
    fn dryrun_generation_yields_wide_background() {
        let outcome = generate_mockup(&DryrunProvider, &BrandQuery::default());
        let background = outcome.background().expect("dryrun background");
        assert_eq!(background.dimensions(), (1600, 900));
        assert_eq!(background.provider, "dryrun");
    }

    #[test]
    fn undecodable_bytes_become_no_image() {
        let outcome = generate_mockup(&GarbageProvider, &BrandQuery::default());
        assert!(matches!(
            outcome,
            GenerationOutcome::NoImage(GenerationError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn provider_errors_become_no_image() {
        let outcome = generate_mockup(&RefusingProvider, &BrandQuery::default());
        assert!(outcome.background().is_none());
        assert!(matches!(
            outcome,
            GenerationOutcome::NoImage(GenerationError::Filtered { .. })
        ));
    }
}
