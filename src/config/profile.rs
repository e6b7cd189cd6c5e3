use std::collections::BTreeMap;

use super::GrantUser;

/// What a deployment knows about its own production database: which users
/// to copy grants for, which tables are dumped partially and with which
/// `WHERE` clause, and which tables are never dumped.
///
/// Filters may reference `:startDate` and `:endDate`.
pub trait Profile {
    fn grant_users(&self) -> &[GrantUser];

    fn default_data_filters(&self) -> &BTreeMap<String, String>;

    fn default_data_excludes(&self) -> &[String];

    fn data_filter_for_table(&self, table: &str) -> Option<&str> {
        self.default_data_filters().get(table).map(String::as_str)
    }
}
