//! Filesystem deployment of an extracted project into the public web root.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::ProjectInfo;
use crate::services::fs_ops;

/// Apache rewrite file written into every deployed project.
pub const REWRITE_FILE: &str = ".htaccess";

/// JSON sidecar describing the deployed project.
pub const PROJECT_INFO_FILE: &str = "project-info.json";

const DEFAULT_INDEX_TEMPLATE: &str = include_str!("templates/default_index.html");

/// Runtime framework of a deployed project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectType {
    Laravel,
    CodeIgniter,
    WordPress,
    Basic,
}

impl ProjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectType::Laravel => "laravel",
            ProjectType::CodeIgniter => "codeigniter",
            ProjectType::WordPress => "wordpress",
            ProjectType::Basic => "basic",
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Probe = fn(&Path) -> bool;

fn is_laravel(root: &Path) -> bool {
    root.join("artisan").is_file() && root.join("public/index.php").is_file()
}

fn is_codeigniter(root: &Path) -> bool {
    root.join("application/config/config.php").is_file()
}

fn is_wordpress(root: &Path) -> bool {
    root.join("wp-config.php").is_file() || root.join("wp-config-sample.php").is_file()
}

/// Framework probes, evaluated in order; the first match wins.
const DETECTORS: &[(Probe, ProjectType)] = &[
    (is_laravel, ProjectType::Laravel),
    (is_codeigniter, ProjectType::CodeIgniter),
    (is_wordpress, ProjectType::WordPress),
];

pub fn detect_project_type(root: &Path) -> ProjectType {
    DETECTORS
        .iter()
        .find(|(probe, _)| probe(root))
        .map(|(_, tag)| *tag)
        .unwrap_or(ProjectType::Basic)
}

/// The directory whose contents get deployed.
///
/// A single top-level directory is unwrapped one level; anything else
/// deploys the extraction root as is.
pub fn effective_root(extracted: &Path) -> io::Result<PathBuf> {
    let entries: Vec<_> = fs::read_dir(extracted)?.collect::<Result<_, _>>()?;
    if let [only] = entries.as_slice()
        && only.file_type()?.is_dir()
    {
        return Ok(only.path());
    }
    Ok(extracted.to_path_buf())
}

/// `RewriteBase` for a project served at `<base>/<slug>/`.
pub fn rewrite_base(public_base_path: &str, slug: &str) -> String {
    format!("{}/{}/", public_base_path.trim_end_matches('/'), slug)
}

/// Rewrite rules for a project type. `basic_entry` is the fallback script
/// for projects without a framework.
pub fn rewrite_rules(project_type: ProjectType, base: &str, basic_entry: &str) -> String {
    let mut rules = format!("RewriteEngine On\nRewriteBase {}\n\n", base);
    match project_type {
        ProjectType::Laravel => rules.push_str(
            "# Handle Front Controller Pattern\n\
             RewriteCond %{REQUEST_FILENAME} !-d\n\
             RewriteCond %{REQUEST_FILENAME} !-f\n\
             RewriteRule ^ public/index.php [L]\n",
        ),
        ProjectType::CodeIgniter => rules.push_str(
            "# Handle Front Controller Pattern\n\
             RewriteCond %{REQUEST_FILENAME} !-d\n\
             RewriteCond %{REQUEST_FILENAME} !-f\n\
             RewriteRule ^ index.php [L]\n",
        ),
        ProjectType::WordPress => rules.push_str(
            "# Handle WordPress\n\
             RewriteCond %{REQUEST_FILENAME} !-f\n\
             RewriteCond %{REQUEST_FILENAME} !-d\n\
             RewriteRule . index.php [L]\n",
        ),
        ProjectType::Basic => {
            rules.push_str(&format!(
                "# Serve files directly if they exist\n\
                 DirectoryIndex {entry}\n\
                 RewriteCond %{{REQUEST_FILENAME}} !-d\n\
                 RewriteCond %{{REQUEST_FILENAME}} !-f\n\
                 RewriteRule ^ {entry} [L]\n\n\
                 # Prevent directory listing\n\
                 Options -Indexes\n",
                entry = basic_entry
            ));
        }
    }
    rules
}

/// Escape text for embedding in HTML.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Render the placeholder page for projects that ship no entry file.
pub fn render_default_index(info: &ProjectInfo, listing: &str) -> String {
    [
        ("{{name}}", info.name.as_str()),
        ("{{description}}", info.description.as_str()),
        ("{{type}}", info.project_type.as_str()),
        ("{{status}}", info.status.as_str()),
        ("{{created_at}}", info.created_at.as_str()),
        ("{{listing}}", listing),
    ]
    .iter()
    .fold(DEFAULT_INDEX_TEMPLATE.to_string(), |page, (key, value)| {
        page.replace(key, &escape_html(value))
    })
}

/// Write the `project-info.json` sidecar.
pub fn write_project_info(dir: &Path, info: &ProjectInfo) -> io::Result<()> {
    let json = serde_json::to_string_pretty(info).map_err(io::Error::other)?;
    fs::write(dir.join(PROJECT_INFO_FILE), json)
}

/// Inputs of one deployment.
#[derive(Debug, Clone)]
pub struct DeployRequest<'a> {
    pub extracted: &'a Path,
    pub web_root: &'a Path,
    pub slug: &'a str,
    pub public_base_path: &'a str,
    /// Used for the placeholder page; the type is filled in after detection
    pub info: &'a ProjectInfo,
}

/// A deployed project folder.
#[derive(Debug, Clone)]
pub struct DeployedProject {
    pub dir: PathBuf,
    pub project_type: ProjectType,
    pub generated_index: bool,
}

/// Copy the extracted project into `<web_root>/<slug>` and generate its
/// rewrite file. Blocking.
///
/// The destination must not exist. On any failure after it was created the
/// destination is removed again.
pub fn deploy(req: &DeployRequest<'_>) -> AppResult<DeployedProject> {
    fs::create_dir_all(req.web_root).map_err(|e| {
        AppError::FileSystem(format!(
            "Failed to create web root {}: {}",
            req.web_root.display(),
            e
        ))
    })?;

    let dest = req.web_root.join(req.slug);
    match fs::create_dir(&dest) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(AppError::Deployment(format!(
                "Project folder '{}' already exists",
                req.slug
            )));
        }
        Err(e) => {
            return Err(AppError::Deployment(format!(
                "Failed to create project folder '{}': {}",
                req.slug, e
            )));
        }
    }

    match populate(req, &dest) {
        Ok(deployed) => Ok(deployed),
        Err(e) => {
            if let Err(cleanup) = fs_ops::remove_dir(&dest) {
                warn!("Failed to remove partial deployment {}: {}", dest.display(), cleanup);
            }
            Err(AppError::Deployment(format!(
                "Failed to deploy project '{}': {}",
                req.slug, e
            )))
        }
    }
}

fn populate(req: &DeployRequest<'_>, dest: &Path) -> io::Result<DeployedProject> {
    let source = effective_root(req.extracted)?;
    fs_ops::copy_dir(&source, dest)?;

    let project_type = detect_project_type(dest);
    let has_php_index = dest.join("index.php").is_file();
    let has_html_index = dest.join("index.html").is_file();
    let basic_entry = if has_php_index { "index.php" } else { "index.html" };

    let rules = rewrite_rules(
        project_type,
        &rewrite_base(req.public_base_path, req.slug),
        basic_entry,
    );
    fs::write(dest.join(REWRITE_FILE), rules)?;

    let mut generated_index = false;
    if project_type == ProjectType::Basic && !has_php_index && !has_html_index {
        let mut info = req.info.clone();
        info.project_type = project_type.as_str().to_string();
        let listing = fs_ops::list_tree(dest)?;
        fs::write(dest.join("index.html"), render_default_index(&info, &listing))?;
        generated_index = true;
    }

    info!(
        "Deployed {} project to {}",
        project_type,
        dest.display()
    );
    Ok(DeployedProject {
        dir: dest.to_path_buf(),
        project_type,
        generated_index,
    })
}
