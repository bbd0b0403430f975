pub mod auth;
pub mod compositor;
pub mod config;
pub mod context;
pub mod error;
pub mod mockup;
pub mod pipeline;
pub mod providers;
pub mod scout;

pub use compositor::{composite_logo, plan_placement, LogoPlacement};
pub use config::{BrandScoutConfig, GenerationBackend};
pub use context::AppContext;
pub use error::{AuthInitError, CompositeError, GenerationError, ScoutError};
pub use mockup::{GeneratedBackground, GenerationOutcome};
pub use pipeline::{DesignOutcome, DesignRun, Orchestrator, ProgressSink, RunWarning, UserLogo};
pub use scout::ScoutOutcome;
