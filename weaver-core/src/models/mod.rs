pub mod character;
pub mod fragment;
pub mod session;
pub mod turn;

pub use character::Character;
pub use fragment::Fragment;
pub use session::{Role, TurnEntry};
pub use turn::TurnResult;
