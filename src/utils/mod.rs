pub mod symbol_table;
pub mod type_formatter;
