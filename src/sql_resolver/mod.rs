// SQL resolver module: literal SQL or .sql file references
pub mod resolver;


pub use resolver::{SqlResolver, SQL_FILE_EXTENSIONS};
