use std::ops::Deref;
use std::sync::Arc;

use crate::config::Parameters;

pub struct InnerContext {
    pub parameters: Parameters,
}

/// Parameters of a run, cheap to clone into worker tasks.
pub struct Context(pub Arc<InnerContext>);

impl Context {
    pub fn new(parameters: Parameters) -> Self {
        Self(Arc::new(InnerContext { parameters }))
    }
}

impl Clone for Context {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl Deref for Context {
    type Target = InnerContext;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}
