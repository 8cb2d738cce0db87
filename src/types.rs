#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub detail: String,
    pub fix_hint: Option<String>,
    /// Which actions need this tool.
    pub used_by: &'static str,
}
