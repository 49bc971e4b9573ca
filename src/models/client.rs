use std::fmt;

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
}

/// One row of a client search: a client joined with one of its phones.
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct ClientPhone {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: i64,
}

impl fmt::Display for ClientPhone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} <{}> {}",
            self.first_name,
            self.last_name,
            self.email.as_deref().unwrap_or("-"),
            self.phone
        )
    }
}

#[derive(Debug, Clone)]
pub struct NewClient {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phones: Vec<i64>,
}

impl NewClient {
    pub fn new(first_name: &str, last_name: &str, email: &str) -> Self {
        Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
            phones: Vec::new(),
        }
    }

    pub fn with_phones(mut self, phones: &[i64]) -> Self {
        self.phones = phones.to_vec();
        self
    }
}

/// Partial update of a client. Empty strings and an empty phone list count
/// as "not provided".
#[derive(Debug, Clone, Default)]
pub struct ClientChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phones: Option<Vec<i64>>,
}

impl ClientChanges {
    /// Drops blank values so only real changes reach the database.
    pub fn normalized(&self) -> ClientChanges {
        fn present(value: &Option<String>) -> Option<String> {
            value.as_ref().filter(|v| !v.is_empty()).cloned()
        }

        ClientChanges {
            first_name: present(&self.first_name),
            last_name: present(&self.last_name),
            email: present(&self.email),
            phones: self.phones.as_ref().filter(|p| !p.is_empty()).cloned(),
        }
    }

    pub fn touches_client_row(&self) -> bool {
        self.first_name.is_some() || self.last_name.is_some() || self.email.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.touches_client_row() && self.phones.is_none()
    }
}

/// Search criteria for [`crate::db::Database::find_clients`].
///
/// Name and email filters are case-insensitive substring matches; `%` and `_`
/// inside a value keep their LIKE meaning. The phone filter is exact.
#[derive(Debug, Clone, Default)]
pub struct ClientFilter {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<i64>,
}

impl ClientFilter {
    pub fn first_name(mut self, value: &str) -> Self {
        self.first_name = Some(value.to_string());
        self
    }

    pub fn last_name(mut self, value: &str) -> Self {
        self.last_name = Some(value.to_string());
        self
    }

    pub fn email(mut self, value: &str) -> Self {
        self.email = Some(value.to_string());
        self
    }

    pub fn phone(mut self, value: i64) -> Self {
        self.phone = Some(value);
        self
    }

    pub fn first_name_pattern(&self) -> Option<String> {
        like_pattern(&self.first_name)
    }

    pub fn last_name_pattern(&self) -> Option<String> {
        like_pattern(&self.last_name)
    }

    pub fn email_pattern(&self) -> Option<String> {
        like_pattern(&self.email)
    }
}

// None means "match anything"; the query skips the predicate entirely so NULL
// emails are not filtered out.
fn like_pattern(value: &Option<String>) -> Option<String> {
    value.as_ref().map(|v| format!("%{}%", v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_changes_are_dropped() {
        let changes = ClientChanges {
            first_name: Some(String::new()),
            last_name: Some("Utkin".to_string()),
            email: None,
            phones: Some(vec![]),
        }
        .normalized();

        assert_eq!(changes.first_name, None);
        assert_eq!(changes.last_name.as_deref(), Some("Utkin"));
        assert_eq!(changes.phones, None);
        assert!(changes.touches_client_row());
        assert!(!changes.is_empty());
    }

    #[test]
    fn phones_only_change_skips_client_row() {
        let changes = ClientChanges {
            phones: Some(vec![89777777777]),
            ..Default::default()
        }
        .normalized();

        assert!(!changes.touches_client_row());
        assert_eq!(changes.phones, Some(vec![89777777777]));
    }

    #[test]
    fn all_blank_is_empty() {
        let changes = ClientChanges {
            first_name: Some(String::new()),
            email: Some(String::new()),
            ..Default::default()
        };
        assert!(changes.normalized().is_empty());
        assert!(ClientChanges::default().is_empty());
    }

    #[test]
    fn filters_become_substring_patterns() {
        let filter = ClientFilter::default().first_name("Vas").email("mail.ru");
        assert_eq!(filter.first_name_pattern().as_deref(), Some("%Vas%"));
        assert_eq!(filter.last_name_pattern(), None);
        assert_eq!(filter.email_pattern().as_deref(), Some("%mail.ru%"));
        assert_eq!(filter.phone, None);
    }

    #[test]
    fn wildcards_are_kept() {
        let filter = ClientFilter::default().last_name("Ut_in");
        assert_eq!(filter.last_name_pattern().as_deref(), Some("%Ut_in%"));
    }

    #[test]
    fn search_rows_render_on_one_line() {
        let row = ClientPhone {
            first_name: "Dmitriy".to_string(),
            last_name: "Gusev".to_string(),
            email: Some("dmitriy.gusev@mail.ru".to_string()),
            phone: 89222222222,
        };
        assert_eq!(row.to_string(), "Dmitriy Gusev <dmitriy.gusev@mail.ru> 89222222222");

        let row = ClientPhone { email: None, ..row };
        assert_eq!(row.to_string(), "Dmitriy Gusev <-> 89222222222");
    }
}
