//! Cost formulas and selectivity estimates

use crate::config::OptimizerConfig;
use crate::ir::{ComparisonOp, Condition};
use crate::schema::SchemaModel;

/// Lower bound on combined selectivity of ANDed predicates
pub const MIN_SELECTIVITY: f64 = 0.001;

/// Row width assumed for tables missing from the schema
const UNKNOWN_ROW_WIDTH: u32 = 64;

/// Estimated surviving-row fraction for one predicate
pub fn selectivity(op: ComparisonOp) -> f64 {
    match op {
        ComparisonOp::Eq => 0.1,
        ComparisonOp::Like | ComparisonOp::ILike => 0.25,
        ComparisonOp::Between => 0.2,
        ComparisonOp::In => 0.15,
        op if op.is_inequality() => 0.33,
        _ => 0.5,
    }
}

/// Product of per-predicate selectivities, floored at `MIN_SELECTIVITY`
pub fn combined_selectivity<'a>(conditions: impl IntoIterator<Item = &'a Condition>) -> f64 {
    conditions
        .into_iter()
        .map(|c| selectivity(c.op))
        .product::<f64>()
        .max(MIN_SELECTIVITY)
}

/// Cost formulas parameterized by optimizer constants and schema statistics
pub struct CostModel<'a> {
    schema: &'a SchemaModel,
    config: &'a OptimizerConfig,
}

impl<'a> CostModel<'a> {
    pub fn new(schema: &'a SchemaModel, config: &'a OptimizerConfig) -> Self {
        Self { schema, config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        self.config
    }

    pub fn schema(&self) -> &SchemaModel {
        self.schema
    }

    /// Row count from statistics, else the configured default
    pub fn table_rows(&self, table: &str) -> f64 {
        self.schema.row_count(table).unwrap_or(self.config.default_row_count) as f64
    }

    pub fn table_width(&self, table: &str) -> u32 {
        self.schema.table(table).map_or(UNKNOWN_ROW_WIDTH, |t| t.row_width())
    }

    /// `ceil(rows * row_bytes / page_bytes)`
    pub fn scan_cost(&self, rows: f64, width: u32) -> f64 {
        (rows * width as f64 / self.config.page_bytes.max(1) as f64).ceil()
    }

    /// B-tree descent plus the pages holding matching rows
    pub fn index_scan_cost(&self, table_rows: f64, matched_rows: f64, width: u32) -> f64 {
        table_rows.max(2.0).log2().ceil() + self.scan_cost(matched_rows, width)
    }

    /// `conditions * k_filter`
    pub fn filter_cost(&self, conditions: usize) -> f64 {
        conditions as f64 * self.config.filter_cost_per_condition
    }

    /// `left * right * k`
    pub fn nested_loop_cost(&self, left_rows: f64, right_rows: f64) -> f64 {
        left_rows * right_rows * self.config.cpu_cost
    }

    /// `(left + right) * k * hash_factor`
    pub fn hash_join_cost(&self, left_rows: f64, right_rows: f64) -> f64 {
        (left_rows + right_rows) * self.config.cpu_cost * self.config.hash_join_factor
    }

    /// `rows * group_columns * k`; a global aggregate counts as one grouping column
    pub fn aggregate_cost(&self, rows: f64, group_columns: usize) -> f64 {
        rows * group_columns.max(1) as f64 * self.config.cpu_cost
    }

    /// `rows * log2(rows) * k`
    pub fn sort_cost(&self, rows: f64) -> f64 {
        if rows <= 1.0 {
            return 0.0;
        }
        rows * rows.log2() * self.config.cpu_cost
    }

    /// Key joins keep the larger input's cardinality
    pub fn join_rows(&self, left_rows: f64, right_rows: f64) -> f64 {
        left_rows.max(right_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ColumnRef, Literal};
    use crate::schema::{Column, ColumnType, Table};

    fn condition(op: ComparisonOp) -> Condition {
        Condition::compare(ColumnRef::new("t", "c"), op, Literal::Integer(1))
    }

    #[test]
    fn test_selectivity_table() {
        assert_eq!(selectivity(ComparisonOp::Eq), 0.1);
        assert_eq!(selectivity(ComparisonOp::ILike), 0.25);
        assert_eq!(selectivity(ComparisonOp::Between), 0.2);
        assert_eq!(selectivity(ComparisonOp::In), 0.15);
        assert_eq!(selectivity(ComparisonOp::Gt), 0.33);
        assert_eq!(selectivity(ComparisonOp::IsNull), 0.5);
    }

    #[test]
    fn test_combined_selectivity_is_floored() {
        let two = [condition(ComparisonOp::Eq), condition(ComparisonOp::Between)];
        assert!((combined_selectivity(&two) - 0.02).abs() < 1e-12);

        let many: Vec<Condition> = (0..5).map(|_| condition(ComparisonOp::Eq)).collect();
        assert_eq!(combined_selectivity(&many), MIN_SELECTIVITY);
        assert_eq!(combined_selectivity(&[]), 1.0);
    }

    #[test]
    fn test_formulas() {
        let schema = SchemaModel::new().with_table(
            Table::new("orders")
                .with_column(Column::new("id", ColumnType::Integer))
                .with_column(Column::new("amount", ColumnType::Float))
                .with_row_count(5_000),
        );
        let config = OptimizerConfig::default();
        let model = CostModel::new(&schema, &config);

        assert_eq!(model.table_rows("orders"), 5_000.0);
        assert_eq!(model.table_rows("unknown"), 1_000.0);
        assert_eq!(model.table_width("orders"), 16);
        assert_eq!(model.scan_cost(5_000.0, 16), 10.0);
        assert_eq!(model.filter_cost(3), 3.0);
        assert!((model.nested_loop_cost(100.0, 10.0) - 10.0).abs() < 1e-9);
        assert!((model.hash_join_cost(100.0, 10.0) - 1.65).abs() < 1e-9);
        assert!((model.aggregate_cost(100.0, 0) - 1.0).abs() < 1e-9);
        assert!((model.sort_cost(8.0) - 0.24).abs() < 1e-9);
        assert_eq!(model.sort_cost(1.0), 0.0);
    }
}
