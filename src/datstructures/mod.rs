pub mod ordered_table;
