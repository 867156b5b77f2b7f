//! Checks shipped with the crate, registered under their short names.

mod echo;
mod overlaps;
mod paths;
mod subpackages;

pub use echo::Echo;
pub use overlaps::Overlaps;
pub use paths::Paths;
pub use subpackages::Subpackages;

use crate::plugins::registry::CheckFactories;

pub(crate) fn register_all(factories: &mut CheckFactories) {
    factories.register("echo", |_| Ok(Box::new(Echo)));
    factories.register("overlaps", |_| Ok(Box::new(Overlaps::new())));
    factories.register("paths", |config| Ok(Box::new(Paths::from_config(config)?)));
    factories.register("subpackages", |config| Ok(Box::new(Subpackages::from_config(config)?)));
}
