pub mod hit;
pub mod state;

pub use hit::{Payload, SimilarityHit};
pub use state::*;
