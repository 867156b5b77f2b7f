pub mod builtin;
pub mod check;
pub mod loader;
pub mod registry;

pub use check::{CheckContext, ProgressCheck};
pub use loader::ResolvedPlan;
pub use registry::{CheckFactories, CheckRegistry};
