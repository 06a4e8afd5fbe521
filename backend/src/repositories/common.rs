//! Shared repository utilities.

use sqlx::{Postgres, QueryBuilder};

/// Appends WHERE or AND to the query builder depending on whether a clause has already been added.
pub fn push_clause(builder: &mut QueryBuilder<'_, Postgres>, has_clause: &mut bool) {
    if *has_clause {
        builder.push(" AND ");
    } else {
        builder.push(" WHERE ");
        *has_clause = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_clause_switches_between_where_and_and() {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new("SELECT 1 FROM sessions");
        let mut has_clause = false;

        push_clause(&mut builder, &mut has_clause);
        builder.push("a = 1");
        push_clause(&mut builder, &mut has_clause);
        builder.push("b = 2");

        assert!(has_clause);
        assert_eq!(builder.sql(), "SELECT 1 FROM sessions WHERE a = 1 AND b = 2");
    }
}
