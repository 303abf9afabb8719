pub mod completion;
pub mod error;
pub mod record;
pub mod schema;
pub mod traits;
pub mod value;

pub use self::completion::*;
pub use self::error::*;
pub use self::record::*;
pub use self::schema::*;
pub use self::traits::*;
pub use self::value::*;
