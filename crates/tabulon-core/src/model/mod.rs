pub mod cell;
pub mod changes;
pub mod content;
pub mod schema;

pub use cell::{CellKind, CellValue};
pub use changes::{Changes, RowChanges, TableChanges, TablesChanges, ValuesChanges};
pub use content::{row, Content, Id, Row, Table, Tables, Values};
pub use schema::{CellSchema, TablesSchema, ValuesSchema};
