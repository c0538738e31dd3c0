use crate::db::value::Value;

/// Comparison operators of the where-language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A boolean expression tree over row columns and bound values.
///
/// This is the narrow DML condition language the arbitration engine needs:
/// comparisons against a column, combined with and/or/not. No joins, no
/// aggregates.
#[derive(Debug, Clone)]
pub enum Cond {
    Cmp { column: usize, op: CmpOp, value: Value },
    And(Vec<Cond>),
    Or(Vec<Cond>),
    Not(Box<Cond>),
}

impl Cond {
    pub fn eq(column: usize, value: Value) -> Cond {
        Cond::Cmp { column, op: CmpOp::Eq, value }
    }

    pub fn ne(column: usize, value: Value) -> Cond {
        Cond::Cmp { column, op: CmpOp::Ne, value }
    }

    pub fn lt(column: usize, value: Value) -> Cond {
        Cond::Cmp { column, op: CmpOp::Lt, value }
    }

    pub fn gt(column: usize, value: Value) -> Cond {
        Cond::Cmp { column, op: CmpOp::Gt, value }
    }

    /// Evaluates the tree against a row. A comparison referring to a column
    /// the row does not have is false.
    pub fn matches(&self, row: &[Value]) -> bool {
        match self {
            Cond::Cmp { column, op, value } => match row.get(*column) {
                None => false,
                Some(cell) => match op {
                    CmpOp::Eq => cell == value,
                    CmpOp::Ne => cell != value,
                    CmpOp::Lt => cell < value,
                    CmpOp::Le => cell <= value,
                    CmpOp::Gt => cell > value,
                    CmpOp::Ge => cell >= value,
                },
            },
            Cond::And(terms) => terms.iter().all(|t| t.matches(row)),
            Cond::Or(terms) => terms.iter().any(|t| t.matches(row)),
            Cond::Not(term) => !term.matches(row),
        }
    }
}
