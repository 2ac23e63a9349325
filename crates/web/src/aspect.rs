//! Cross-cutting callbacks that wrap route handlers.
//!
//! An aspect runs either before or after the handler of the routes it is
//! attached to. Before-aspects come in two strengths: a *default* one is
//! skipped as soon as some earlier step has written the response, while a
//! *mandatory* one runs on every dispatch regardless. After-aspects always
//! run, exactly once, even when an earlier step failed.

use std::fmt;
use std::sync::Arc;

use arbor_http::protocol::Context;

use crate::BoxError;

/// Where in the dispatch sequence an aspect runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Before,
    After,
}

type AspectFn = dyn Fn(&mut Context) -> Result<(), BoxError> + Send + Sync;

/// A named callback attached to routes at registration time.
#[derive(Clone)]
pub struct Aspect {
    name: Arc<str>,
    hook: Hook,
    mandatory: bool,
    func: Arc<AspectFn>,
}

impl Aspect {
    fn new(
        name: &str,
        hook: Hook,
        mandatory: bool,
        f: impl Fn(&mut Context) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        Self { name: Arc::from(name), hook, mandatory, func: Arc::new(f) }
    }

    /// A before-aspect that is skipped once the response has been written.
    pub fn before(name: &str, f: impl Fn(&mut Context) -> Result<(), BoxError> + Send + Sync + 'static) -> Self {
        Self::new(name, Hook::Before, false, f)
    }

    /// A before-aspect that runs on every dispatch, written response or not.
    pub fn mandatory_before(
        name: &str,
        f: impl Fn(&mut Context) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, Hook::Before, true, f)
    }

    /// After-aspects are always run, so there is no default/mandatory split.
    pub fn after(name: &str, f: impl Fn(&mut Context) -> Result<(), BoxError> + Send + Sync + 'static) -> Self {
        Self::new(name, Hook::After, true, f)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hook(&self) -> Hook {
        self.hook
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn invoke(&self, ctx: &mut Context) -> Result<(), BoxError> {
        (self.func)(ctx)
    }
}

impl fmt::Debug for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aspect")
            .field("name", &self.name)
            .field("hook", &self.hook)
            .field("mandatory", &self.mandatory)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_hook_and_strength() {
        let before = Aspect::before("auth", |_| Ok(()));
        assert_eq!(before.hook(), Hook::Before);
        assert!(!before.is_mandatory());

        let mandatory = Aspect::mandatory_before("audit", |_| Ok(()));
        assert_eq!(mandatory.hook(), Hook::Before);
        assert!(mandatory.is_mandatory());

        let after = Aspect::after("metrics", |_| Ok(()));
        assert_eq!(after.hook(), Hook::After);
        assert!(after.is_mandatory());
        assert_eq!(after.name(), "metrics");
    }
}
