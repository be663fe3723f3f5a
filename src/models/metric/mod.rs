pub mod metric_row;
