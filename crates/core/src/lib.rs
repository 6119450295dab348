pub mod events;
pub mod models;
pub mod requests;
pub mod traits;

pub use events::*;
pub use models::*;
pub use requests::*;
pub use traits::*;
