//! Candidate README locations and the naming rules derived from them.

use std::collections::HashSet;

/// A README that might describe an MCP server launch manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub owner: String,
    pub repo: String,
    /// Path of the README inside the repository.
    pub path: String,
}

impl Candidate {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            path: path.into(),
        }
    }

    /// `owner/repo` of the physical repository.
    pub fn repository(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Composite dedup key: repository plus file path.
    pub fn key(&self) -> (String, String) {
        (self.repository(), self.path.clone())
    }
}

/// Drop repeated (repository, path) pairs, keeping the first occurrence.
pub fn dedup_candidates(candidates: impl IntoIterator<Item = Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.key()))
        .collect()
}

/// Directory components of a file path, without the file name.
///
/// `src/server/README.md` gives `src/server`; a root README gives `""`.
pub fn directory_prefix(path: &str) -> &str {
    let path = path.trim_matches('/');
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Whether `path` lives under `prefix` (a directory, or `""` for the root).
pub fn is_under(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        return true;
    }
    let path = path.trim_start_matches('/');
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Catalog identity of a README: the repository name and web URL with the
/// README's directory appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLocation {
    pub full_name: String,
    pub url: String,
}

impl RepoLocation {
    pub fn derive(
        base_full_name: &str,
        html_url: &str,
        default_branch: &str,
        readme_path: &str,
    ) -> Self {
        let dir = directory_prefix(readme_path);
        if dir.is_empty() {
            return Self {
                full_name: base_full_name.to_string(),
                url: html_url.to_string(),
            };
        }
        Self {
            full_name: format!("{base_full_name}/{dir}"),
            url: format!(
                "{}/tree/{}/{}",
                html_url.trim_end_matches('/'),
                default_branch,
                dir
            ),
        }
    }
}

/// Split a catalog name `owner/repo[/dir...]` into a candidate whose path
/// is `[dir/]<readme_name>`. Returns `None` for malformed names.
pub fn candidate_for_full_name(full_name: &str, readme_name: &str) -> Option<Candidate> {
    let mut parts = full_name.trim().trim_matches('/').splitn(3, '/');
    let owner = parts.next().filter(|s| !s.is_empty())?;
    let repo = parts.next().filter(|s| !s.is_empty())?;
    let path = match parts.next().map(|d| d.trim_matches('/')) {
        Some(dir) if !dir.is_empty() => format!("{dir}/{readme_name}"),
        _ => readme_name.to_string(),
    };
    Some(Candidate::new(owner, repo, path))
}

/// Cheap pre-filter: does the README mention any launch-manifest keyword?
pub fn contains_manifest_keyword<S: AsRef<str>>(readme: &str, keywords: &[S]) -> bool {
    keywords
        .iter()
        .map(AsRef::as_ref)
        .filter(|k| !k.is_empty())
        .any(|k| readme.contains(k))
}
