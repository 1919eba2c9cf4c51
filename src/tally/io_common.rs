use std::path::Path;

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

pub fn make_default_id(path: &str) -> impl Fn(usize) -> String {
    let simplified_file_name = simplify_file_name(path);
    move |lineno| format!("{}-{:08}", simplified_file_name, lineno)
}

/// The encoded vote of a cell. Spreadsheets often pad the numbers with spaces.
pub fn normalize_vote(cell: &str) -> String {
    cell.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ids() {
        let f = make_default_id("/data/votes/board.csv");
        assert_eq!(f(12), "board.csv-00000012");
        assert_eq!(simplify_file_name("votes.json"), "votes.json");
        assert_eq!(normalize_vote(" 12\t"), "12");
    }
}
