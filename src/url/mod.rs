use crate::error::{Error, Result};

/// REST endpoints of one WordPress site.
///
/// Project Manager routes live under `/wp-json/{namespace}` (default `pm/v2`),
/// content types under the core `/wp-json/wp/v2` namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    site: String,
    namespace: String,
}

impl Endpoints {
    pub fn new(site_url: &str, namespace: &str) -> Result<Self> {
        let site = site_url.trim().trim_end_matches('/');
        let parsed = url::Url::parse(site).map_err(|e| Error::UrlParse(format!("{site}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::UrlParse(format!(
                "site URL must use http or https: {site}"
            )));
        }
        let namespace = namespace.trim().trim_matches('/');
        if namespace.is_empty() {
            return Err(Error::Config("api_namespace must not be empty".into()));
        }
        Ok(Self {
            site: site.to_string(),
            namespace: namespace.to_string(),
        })
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn projects(&self) -> String {
        format!("{}/wp-json/{}/projects", self.site, self.namespace)
    }

    pub fn project(&self, project_id: &str) -> String {
        item_url(&self.projects(), project_id)
    }

    pub fn task_lists(&self, project_id: &str) -> String {
        child_collection(&self.projects(), project_id, "task-lists")
    }

    pub fn tasks(&self, project_id: &str) -> String {
        child_collection(&self.projects(), project_id, "tasks")
    }

    pub fn post_types(&self) -> String {
        format!("{}/wp-json/wp/v2/types", self.site)
    }

    pub fn posts(&self, rest_base: &str) -> String {
        format!("{}/wp-json/wp/v2/{}", self.site, rest_base.trim_matches('/'))
    }
}

/// `{collection}/{id}`
pub fn item_url(collection: &str, id: &str) -> String {
    format!("{}/{}", collection.trim_end_matches('/'), id)
}

/// `{collection}/{parent_id}/{child}`
pub fn child_collection(collection: &str, parent_id: &str, child: &str) -> String {
    format!("{}/{}/{}", collection.trim_end_matches('/'), parent_id, child)
}

/// Check if a string looks like a remote identifier (all digits).
pub fn is_numeric_id(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// Extract a project id from a raw id, a Project Manager admin URL
/// (`/wp-admin/admin.php?page=pm_projects#/projects/12/task-lists`) or a
/// REST URL (`/wp-json/pm/v2/projects/12`).
pub fn resolve_project_id(input: &str) -> Result<String> {
    let input = input.trim();
    if is_numeric_id(input) {
        return Ok(input.to_string());
    }
    if !input.contains("://") {
        return Err(Error::InvalidIdentifier(format!(
            "expected a numeric project id or a project URL: {input}"
        )));
    }

    let url = url::Url::parse(input).map_err(|e| Error::UrlParse(e.to_string()))?;

    // The admin SPA keeps its route in the fragment.
    if let Some(fragment) = url.fragment() {
        if let Some(id) = id_after_projects(fragment.split('/')) {
            return Ok(id);
        }
    }

    if let Some(segments) = url.path_segments() {
        if let Some(id) = id_after_projects(segments) {
            return Ok(id);
        }
    }

    if let Some((_, id)) = url
        .query_pairs()
        .find(|(k, v)| k == "project_id" && is_numeric_id(v))
    {
        return Ok(id.into_owned());
    }

    Err(Error::UrlParse(format!(
        "no project id found in URL: {input}"
    )))
}

fn id_after_projects<'a>(segments: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut segments = segments.skip_while(|s| *s != "projects");
    segments.next()?;
    segments
        .next()
        .filter(|s| is_numeric_id(s))
        .map(|s| s.to_string())
}
