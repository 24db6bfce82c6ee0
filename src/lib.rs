pub mod consts;
pub mod error;
pub mod scalar;
pub mod shape;
pub mod rank;
pub mod fft;
pub mod conv;
pub mod cost;
pub mod regularization;
pub mod optim;
pub mod driver;

pub use error::{Result, TipiError};
