pub mod asset;
pub mod data_type;
pub mod node;
pub mod timeframe;
pub mod value;

pub use asset::{Asset, AssetClass};
pub use data_type::DataType;
pub use node::{AlgorithmNode, CompiledProgram, InputValue};
pub use timeframe::{Timeframe, TimeframeUnit};
pub use value::{OptionValue, Scalar};
