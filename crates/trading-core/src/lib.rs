pub mod asset_class;
pub mod error;
pub mod settings;
pub mod types;

pub use asset_class::{AssetClass, ClassProfile};
pub use error::TradingError;
pub use settings::{GlobalSettings, TimeoutAction};
pub use types::*;
