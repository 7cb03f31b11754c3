// CSV transfer engine: COPY commands, file streams, export and import
pub mod copy_command;
pub mod export;
pub mod import;
pub mod stream;


pub use copy_command::{export_command, quote_identifier, quote_literal, quote_table_name, ImportCommand};
pub use export::Exporter;
pub use import::Importer;
