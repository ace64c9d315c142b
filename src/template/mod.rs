//! Manifest templating
//!
//! Rack manifests are minijinja templates embedded in the binary. Besides
//! the parameters passed at render time, templates can call identity
//! helpers:
//!
//! - `rack()`, `namespace()`, `domain()`, `version()`, `image()`
//! - `app_namespace(app)` - namespace an app's resources live in
//!
//! Filters: `base64_encode`, `upper`, `lower`.

mod error;
mod filters;
mod helpers;
mod renderer;

pub use error::TemplateError;
pub use renderer::{Templater, BUNDLE};
