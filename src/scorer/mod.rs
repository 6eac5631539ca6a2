pub mod guess_scorer;

pub use guess_scorer::{parse_price, rescore, score};
