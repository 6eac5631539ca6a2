pub mod ranker;

pub use ranker::rank;
