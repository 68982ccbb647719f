//! Request handlers.

pub mod files;
pub mod health;
pub mod images;
pub mod placeholder;
pub mod stream;
pub mod videos;

pub use files::*;
pub use health::*;
pub use images::*;
pub use placeholder::*;
pub use stream::*;
pub use videos::*;
