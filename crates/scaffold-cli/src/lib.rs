pub mod bulk;
pub mod create;
pub mod maintenance;
pub mod report;
pub mod telemetry;
pub mod template;

pub use bulk::*;
pub use create::*;
pub use maintenance::*;
pub use report::*;
pub use telemetry::*;
pub use template::*;
