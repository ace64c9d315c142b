//! Template helper functions
//!
//! Helpers close over the rack identity, which is fully built before the
//! template environment is. They only read it.

use std::sync::Arc;

use minijinja::Environment;

use crate::provider::Identity;

/// Register identity helpers on a template environment
pub fn register(env: &mut Environment<'static>, identity: Arc<Identity>) {
    let id = identity.clone();
    env.add_function("rack", move || id.name.clone());

    let id = identity.clone();
    env.add_function("namespace", move || id.namespace.clone());

    let id = identity.clone();
    env.add_function("app_namespace", move |app: String| id.app_namespace(&app));

    let id = identity.clone();
    env.add_function("domain", move || id.domain.clone());

    let id = identity.clone();
    env.add_function("version", move || id.version.clone());

    env.add_function("image", move || identity.image.clone());
}
