pub mod filter;
pub mod package;
pub mod plan;
pub mod report;
pub mod severity;

pub use filter::{ImportMode, WorkspaceFilter};
pub use package::{PackageId, PackageProperties};
pub use plan::{CheckSpec, Checklist, EffectiveCheck, ForcedRoot, InitStage, InstallHookPolicy, Plan};
pub use report::{ScanReport, Violation};
pub use severity::Severity;
