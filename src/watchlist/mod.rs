pub mod normalize;
pub mod store;

pub use normalize::{normalize, MIN_PLATE_LEN};
pub use store::{WatchedPlate, WatchlistError, WatchlistStore};
