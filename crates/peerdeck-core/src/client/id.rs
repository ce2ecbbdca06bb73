/// Id of the always-present local tab.
pub const LOCAL_TAB_ID: &str = "local";

/// Tab id format for remotes: "remote:{alias}"
pub fn make_tab_id(alias: &str) -> String {
    format!("remote:{}", alias)
}

/// Extract the alias from a remote tab id.
/// Returns `None` for the local tab and for ids without the remote prefix.
pub fn alias_from_tab_id(tab_id: &str) -> Option<&str> {
    tab_id.strip_prefix("remote:").filter(|alias| !alias.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_tab_id_format() {
        assert_eq!(make_tab_id("work-laptop"), "remote:work-laptop");
    }

    #[test]
    fn alias_round_trips_through_tab_id() {
        assert_eq!(alias_from_tab_id(&make_tab_id("box:2")), Some("box:2"));
    }

    #[test]
    fn local_and_malformed_ids_have_no_alias() {
        assert_eq!(alias_from_tab_id(LOCAL_TAB_ID), None);
        assert_eq!(alias_from_tab_id("remote:"), None);
        assert_eq!(alias_from_tab_id("work"), None);
    }
}
