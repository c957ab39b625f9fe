pub mod batch;
pub mod flux;
pub mod history;
pub mod image;

pub use self::batch::*;
pub use self::flux::*;
pub use self::history::*;
pub use self::image::*;
