pub mod buyer;
pub mod matching;
pub mod property;
pub mod search_area;

pub use buyer::{Buyer, BuyerProfile, Client, ClientId};
pub use matching::*;
pub use property::*;
pub use search_area::{SearchArea, SearchAreaError, ZoneFeature};
