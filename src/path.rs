use crate::routing_tree::TreeError;

pub const DEFAULT_PATH_SEPARATOR: char = '-';

/// Split a path string into its level keys.
///
/// One trailing separator is tolerated, which is the shape `resolve` returns.
pub fn split_path(path: &str, separator: char) -> Result<Vec<&str>, TreeError> {
    let trimmed = path.strip_suffix(separator).unwrap_or(path);
    if trimmed.is_empty() {
        return Err(TreeError::EmptyPath);
    }

    let levels: Vec<&str> = trimmed.split(separator).collect();
    if levels.iter().any(|level| level.is_empty()) {
        return Err(TreeError::EmptyLevel { path: path.to_string() });
    }

    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_single_level() {
        assert_eq!(split_path("D1", '-').unwrap(), vec!["D1"]);
    }

    #[test]
    fn test_split_three_levels() {
        assert_eq!(split_path("D1-S1-T1", '-').unwrap(), vec!["D1", "S1", "T1"]);
    }

    #[test]
    fn test_split_accepts_trailing_separator() {
        assert_eq!(split_path("D1-S1-T1-", '-').unwrap(), vec!["D1", "S1", "T1"]);
    }

    #[test]
    fn test_split_custom_separator() {
        assert_eq!(split_path("db/shard/table", '/').unwrap(), vec!["db", "shard", "table"]);
        assert_eq!(split_path("db-1/shard-2", '/').unwrap(), vec!["db-1", "shard-2"]);
    }

    #[test]
    fn test_split_rejects_empty_input() {
        assert!(matches!(split_path("", '-'), Err(TreeError::EmptyPath)));
        assert!(matches!(split_path("-", '-'), Err(TreeError::EmptyPath)));
    }

    #[test]
    fn test_split_rejects_empty_levels() {
        assert!(matches!(split_path("D1--T1", '-'), Err(TreeError::EmptyLevel { .. })));
        assert!(matches!(split_path("-D1", '-'), Err(TreeError::EmptyLevel { .. })));
        assert!(matches!(split_path("D1--", '-'), Err(TreeError::EmptyLevel { .. })));
    }
}
