//! The single isolation predicate every repository query must splice in.
//!
//! A row is visible to a caller iff it owns the row, or the row is marked
//! shared-with-admins and the caller is an admin. No repository function may
//! hand-write this clause itself; they all call `scope_clause`/`scope_binds`
//! so the rule can only be changed in one place.

use ck_domain::model::Caller;

/// SQL fragment to AND onto a query's WHERE clause. `owner_col` and
/// `access_col` name the row's owner/access-level columns in the query.
pub fn scope_clause(owner_col: &str, access_col: &str) -> String {
    format!("({owner_col} = ? OR ({access_col} = 'shared_with_admins' AND ? = 1))")
}

/// Bind values matching `scope_clause`'s two placeholders, in order.
pub fn scope_binds(caller: &Caller) -> (String, i64) {
    (caller.id.clone(), i64::from(caller.is_admin))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clause_has_two_placeholders() {
        let clause = scope_clause("owner_id", "access_level");
        assert_eq!(clause.matches('?').count(), 2);
    }

    #[test]
    fn binds_reflect_admin_flag() {
        let admin = Caller {
            id: "u1".into(),
            is_admin: true,
            display_name: None,
        };
        assert_eq!(scope_binds(&admin), ("u1".to_string(), 1));
        let user = Caller::anonymous("u2");
        assert_eq!(scope_binds(&user), ("u2".to_string(), 0));
    }
}
