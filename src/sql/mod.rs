pub mod migrations;
pub mod row;
pub mod statements;
