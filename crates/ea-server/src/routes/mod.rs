mod control;
mod market;
mod ops;
mod trades;

pub use control::control_router;
pub use market::tick_router;
pub use ops::{log_router, ops_router};
pub use trades::trade_router;
