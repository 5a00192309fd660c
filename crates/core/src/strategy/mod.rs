//! Strategy catalog: the ordered ways of attempting a download.

mod descriptor;
mod resolve;

pub use descriptor::{AuthUse, FormatPolicy, StrategyCatalog, StrategyDescriptor};
pub use resolve::{format_expression, resolve, ResolvedOptions};
