//! Template Renderer
//!
//! Renders manifests from the embedded template bundle with strict
//! undefined handling, so a missing parameter fails instead of producing
//! an empty field.

use std::sync::Arc;

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

use super::error::TemplateError;
use super::{filters, helpers};
use crate::provider::Identity;

/// Templates compiled into the binary, by name
pub const BUNDLE: &[(&str, &str)] = &[
    ("app.yml", include_str!("files/app.yml")),
    ("env.yml", include_str!("files/env.yml")),
];

/// Manifest template renderer
pub struct Templater {
    env: Environment<'static>,
}

impl Templater {
    /// Create a renderer over the embedded bundle
    pub fn new(identity: Arc<Identity>) -> Result<Self, TemplateError> {
        Self::with_bundle(BUNDLE, identity)
    }

    /// Create a renderer over an arbitrary static bundle
    pub fn with_bundle(
        bundle: &[(&'static str, &'static str)],
        identity: Arc<Identity>,
    ) -> Result<Self, TemplateError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        env.add_filter("base64_encode", filters::base64_encode);
        env.add_filter("upper", filters::upper);
        env.add_filter("lower", filters::lower);
        helpers::register(&mut env, identity);

        for &(name, source) in bundle {
            env.add_template(name, source)
                .map_err(|source| TemplateError::Load {
                    name: name.to_string(),
                    source,
                })?;
        }

        Ok(Self { env })
    }

    /// Render a bundled template with the given parameters
    pub fn render<S: Serialize>(&self, name: &str, params: S) -> Result<String, TemplateError> {
        let template = self.env.get_template(name)?;
        Ok(template.render(params)?)
    }

    /// Names of all loaded templates
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.env.templates().map(|(name, _)| name).collect();
        names.sort_unstable();
        names
    }
}
