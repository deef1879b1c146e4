pub mod diagnostics;
pub mod ev_calculator;
pub mod logistic;
pub mod odds;
pub mod odds_fetcher;
pub mod pipeline;
pub mod predictor;
pub mod ratings;

pub use diagnostics::*;
pub use ev_calculator::*;
pub use logistic::*;
pub use odds::*;
pub use pipeline::*;
pub use predictor::*;
pub use ratings::*;
