pub mod classify;
pub mod error;
pub mod history;
pub mod live;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod settings;
pub mod source;
pub mod timezone;

pub use error::{NoiseError, Result};
