// Wiki protocol: scrapes the MediaWiki macro catalog and module index.
//
// All extraction is regex driven and best effort; a malformed entry is
// skipped, never fatal to the rest of the catalog. Parsing is kept
// separate from fetching so it can run against captured page content.

use crate::flags::apply_predefined_flags;
use crate::host::{Host, path_to_url};
use crate::http;
use crate::package::{InstallResult, Package, PackageKind, ReadmeFormat};
use crate::protocol::Protocol;
use async_trait::async_trait;
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Maximum wiki redirect hops followed before giving up.
const MAX_REDIRECTS: usize = 3;

lazy_static! {
    // {{MacroLink|Icon=<icon>|Macro <name>/<lang>|Macro <label>}}: <description>
    static ref MACRO_LINK: Regex = Regex::new(
        r"(?mi)\{\{\s*MacroLink\s*\|(?:\s*Icon=(?P<icon>[^|]+)\|)?\s*Macro[ _](?P<name>[^|/]+?)(?:/[^|]+)?\s*\|\s*(?:Macro[ _])?(?P<label>[^|}]+?)\s*\}\}\s*:\s*(?P<description>.*?)\s*$"
    )
    .unwrap();

    // {{MacroCode|code=...}} with the payload running to the closing braces
    static ref MACRO_CODE: Regex =
        Regex::new(r"(?s)\{\{MacroCode\s*\|\s*(?:code=)?(?P<code>.*?)\n\s*\}\}").unwrap();

    // Legacy code markup predating the template
    static ref PRE_BLOCK: Regex = Regex::new(r"(?s)<pre>\n?(?P<code>.*?)</pre>").unwrap();

    // {{Codeextralink|<url>|...}} marks macros hosted outside the wiki
    static ref CODE_EXTRA_LINK: Regex =
        Regex::new(r"(?i)\{\{\s*Codeextralink\s*\|\s*(?P<url>[^|}]+?)\s*[|}]").unwrap();

    static ref REDIRECT: Regex =
        Regex::new(r"(?i)^\s*#REDIRECT\s*\[\[(?P<target>[^\]]+)\]\]").unwrap();

    static ref FILE_LINK: Regex =
        Regex::new(r"(?i)\[\[(?:File|Image):(?P<icon>[^|\]]+)").unwrap();

    static ref PAGE_LINK: Regex =
        Regex::new(r"\[\[(?P<name>[^|\]]+?)(?:\|(?P<title>[^\]]+?))?\]\]").unwrap();
}

#[derive(Debug, Deserialize)]
struct WikiQueryResponse {
    query: Option<WikiQuery>,
}

#[derive(Debug, Deserialize)]
struct WikiQuery {
    #[serde(default)]
    pages: Vec<WikiPage>,
}

#[derive(Debug, Deserialize)]
struct WikiPage {
    #[serde(default)]
    revisions: Vec<WikiRevision>,
}

#[derive(Debug, Deserialize)]
struct WikiRevision {
    slots: Option<WikiSlots>,
}

#[derive(Debug, Deserialize)]
struct WikiSlots {
    main: WikiSlot,
}

#[derive(Debug, Deserialize)]
struct WikiSlot {
    content: Option<String>,
}

impl WikiQueryResponse {
    /// Wikitext of the first page revision in a `formatversion=2` reply.
    fn page_content(self) -> Option<String> {
        self.query?
            .pages
            .into_iter()
            .next()?
            .revisions
            .into_iter()
            .next()?
            .slots?
            .main
            .content
    }
}

/// One row of the wiki-maintained module index table, keyed by
/// repository URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModIndexEntry {
    pub name: String,
    pub title: String,
    pub description: Option<String>,
    pub categories: Option<String>,
    pub author: Option<String>,
    pub flag: Option<String>,
    pub icon: Option<String>,
}

/// Extracted macro source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroSource {
    Code(String),
    /// The wiki page only links to an externally hosted file.
    ExternalLink(String),
}

/// Pull macro source code out of a wiki page: the code template first,
/// the legacy `<pre>` block second. An external-link template means the
/// code is not on the wiki at all.
pub fn extract_macro_code(wikitext: &str) -> Option<MacroSource> {
    if let Some(caps) = MACRO_CODE.captures(wikitext) {
        return Some(MacroSource::Code(caps["code"].to_string()));
    }
    if let Some(caps) = PRE_BLOCK.captures(wikitext) {
        return Some(MacroSource::Code(caps["code"].to_string()));
    }
    if let Some(caps) = CODE_EXTRA_LINK.captures(wikitext) {
        return Some(MacroSource::ExternalLink(caps["url"].to_string()));
    }
    None
}

fn special_file_url(wiki: &str, icon: &str) -> String {
    format!(
        "{}/Special:Redirect/file/{}",
        wiki,
        icon.trim().replace(' ', "_")
    )
}

/// Parse the catalog page of macro entries into packages.
pub fn parse_macro_catalog(host: &Host, wikitext: &str, wiki: &str) -> Vec<Package> {
    let default_icon = path_to_url(
        &host
            .core_resource_dir
            .join("icons")
            .join("package_macro.svg"),
    );
    let mut macros = Vec::new();

    for caps in MACRO_LINK.captures_iter(wikitext) {
        let name = caps["name"].trim().replace(' ', "_");
        if name.is_empty() {
            continue;
        }
        let icon = caps
            .name("icon")
            .map(|i| special_file_url(wiki, i.as_str()))
            .unwrap_or_else(|| default_icon.clone());

        let mut pkg = Package {
            key: name.clone(),
            name: name.clone(),
            title: Some(caps["label"].trim().to_string()),
            description: Some(caps["description"].trim().to_string()),
            kind: PackageKind::Macro,
            install_dir: Some(host.user_macro_dir.clone()),
            install_file: Some(host.user_macro_dir.join(format!("{}.FCMacro", name))),
            icon: Some(icon),
            is_wiki: true,
            readme_url: Some(format!("{}/Macro_{}?origin=*", wiki, name)),
            readme_format: ReadmeFormat::Html,
            ..Package::default()
        };
        apply_predefined_flags(&mut pkg);
        macros.push(pkg);
    }
    macros
}

/// Split a MediaWiki table into rows of trimmed cell strings. A line
/// outside a cell marker continues the previous cell.
fn mod_table_rows(wikitext: &str) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Option<Vec<String>> = None;

    for line in wikitext.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("{|") || trimmed.starts_with("|}") || trimmed.starts_with('!') {
            continue;
        }
        if trimmed.starts_with("|-") {
            if let Some(cells) = row.take() {
                rows.push(cells);
            }
            row = Some(Vec::new());
        } else if let Some(cell) = trimmed.strip_prefix('|') {
            if let Some(cells) = row.as_mut() {
                cells.push(cell.trim_start_matches('|').trim().to_string());
            }
        } else if let Some(last) = row.as_mut().and_then(|cells| cells.last_mut()) {
            last.push(' ');
            last.push_str(trimmed.trim_end());
        }
    }
    if let Some(cells) = row.take() {
        rows.push(cells);
    }
    rows
}

fn non_empty(cell: &str) -> Option<String> {
    let trimmed = cell.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Parse the wiki-maintained module index table. Row layout: icon, page
/// link, topics, description, authors, repository URL, optional flag.
pub fn parse_mod_index(wikitext: &str, wiki: &str) -> BTreeMap<String, ModIndexEntry> {
    let mut index = BTreeMap::new();

    for cells in mod_table_rows(wikitext) {
        if cells.len() < 6 {
            continue;
        }
        let Some(link) = PAGE_LINK.captures(&cells[1]) else {
            continue;
        };
        let name = link["name"].trim().to_string();
        let title = link
            .name("title")
            .map(|t| t.as_str().trim().to_string())
            .unwrap_or_else(|| name.clone());
        let repo = super::git_host::repo_base(cells[5].trim());
        if repo.is_empty() {
            continue;
        }

        let entry = ModIndexEntry {
            name,
            title,
            description: non_empty(&cells[3]),
            categories: non_empty(&cells[2]),
            author: non_empty(&cells[4]),
            flag: cells.get(6).and_then(|c| non_empty(c)),
            icon: FILE_LINK
                .captures(&cells[0])
                .map(|c| special_file_url(wiki, &c["icon"])),
        };
        index.insert(repo, entry);
    }
    index
}

/// Fetch and parse the module index table used to enrich git-hosting
/// listings. Empty on any network or parse failure.
pub async fn get_mod_index(index_url: &str, wiki: &str) -> BTreeMap<String, ModIndexEntry> {
    match http::fetch_json::<WikiQueryResponse>(index_url).await {
        Some(response) => match response.page_content() {
            Some(content) => parse_mod_index(&content, wiki),
            None => BTreeMap::new(),
        },
        None => BTreeMap::new(),
    }
}

/// Protocol over a MediaWiki installation. Modules are never listed
/// here; the wiki only indexes macros, and its module table is consumed
/// through the git-hosting protocol instead.
pub struct WikiProtocol {
    url: String,
    wiki: String,
}

impl WikiProtocol {
    pub fn new(url: String, wiki: String) -> Self {
        Self { url, wiki }
    }

    fn page_query_url(&self, title: &str) -> String {
        format!(
            "{}/api.php?action=query&prop=revisions&titles={}&rvslots=%2A&rvprop=content&formatversion=2&format=json",
            self.wiki,
            urlencoding::encode(title)
        )
    }

    async fn page_content(&self, title: &str) -> Option<String> {
        http::fetch_json::<WikiQueryResponse>(&self.page_query_url(title))
            .await?
            .page_content()
    }

    /// Page content for a macro, following redirects up to a fixed
    /// hop count.
    async fn macro_page_content(&self, name: &str) -> Option<String> {
        let mut title = format!("Macro_{}", name);
        for _ in 0..=MAX_REDIRECTS {
            let content = self.page_content(&title).await?;
            let Some(caps) = REDIRECT.captures(&content) else {
                return Some(content);
            };
            title = caps["target"].trim().replace(' ', "_");
            debug!("Following wiki redirect to {}", title);
        }
        warn!("Too many wiki redirects for {}", name);
        None
    }
}

#[async_trait]
impl Protocol for WikiProtocol {
    async fn get_mod_list(&self, _host: &Host) -> Vec<Package> {
        Vec::new()
    }

    async fn get_macro_list(&self, host: &Host) -> Vec<Package> {
        match http::fetch_json::<WikiQueryResponse>(&self.url).await {
            Some(response) => match response.page_content() {
                Some(content) => parse_macro_catalog(host, &content, &self.wiki),
                None => Vec::new(),
            },
            None => Vec::new(),
        }
    }

    async fn install_mod(&self, _host: &Host, pkg: &mut Package) -> InstallResult {
        InstallResult::failed(format!("{} cannot be installed from the wiki", pkg.name))
    }

    async fn install_macro(&self, _host: &Host, pkg: &mut Package) -> InstallResult {
        let mut result = InstallResult::default();
        let Some(install_file) = pkg.install_file.clone() else {
            result.message = Some("Macro has no install target".to_string());
            return result;
        };

        let Some(wikitext) = self.macro_page_content(&pkg.name).await else {
            result.message = Some("Could not fetch the macro page".to_string());
            return result;
        };

        match extract_macro_code(&wikitext) {
            Some(MacroSource::Code(code)) => {
                let written = install_file
                    .parent()
                    .map(std::fs::create_dir_all)
                    .unwrap_or(Ok(()))
                    .and_then(|_| std::fs::write(&install_file, code));
                match written {
                    Ok(()) => {
                        info!("Installed {}", install_file.display());
                        result.ok = true;
                    }
                    Err(err) => {
                        warn!("Macro install of {} failed: {}", pkg.name, err);
                        result.message =
                            Some("Macro was not installed, please contact the maintainer.".to_string());
                    }
                }
            }
            Some(MacroSource::ExternalLink(url)) => {
                result.message = Some(format!(
                    "This macro must be downloaded manually: <a href=\"{0}\">{0}</a>",
                    url
                ));
            }
            None => {
                result.message = Some("No macro code found in the wiki page".to_string());
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const WIKI: &str = "https://wiki.example.org";

    fn test_host(dir: &TempDir) -> Host {
        Host::for_root(dir.path())
    }

    #[test]
    fn catalog_entry_becomes_macro_package() {
        let dir = TempDir::new().unwrap();
        let host = test_host(&dir);
        let page = "{{MacroLink|Macro Foo|Macro Foo}}: does X\n";

        let macros = parse_macro_catalog(&host, page, WIKI);
        assert_eq!(macros.len(), 1);
        let pkg = &macros[0];
        assert_eq!(pkg.name, "Foo");
        assert_eq!(pkg.kind, PackageKind::Macro);
        assert!(pkg.is_wiki);
        assert_eq!(pkg.description.as_deref(), Some("does X"));
        assert_eq!(
            pkg.readme_url.as_deref(),
            Some("https://wiki.example.org/Macro_Foo?origin=*")
        );
        assert_eq!(
            pkg.install_file.as_deref(),
            Some(host.user_macro_dir.join("Foo.FCMacro").as_path())
        );
    }

    #[test]
    fn catalog_entry_with_icon_and_language_suffix() {
        let dir = TempDir::new().unwrap();
        let host = test_host(&dir);
        let page = "{{MacroLink|Icon=Macroicon.png|Macro Bar Baz/en|Macro Bar Baz}}: translated\n";

        let macros = parse_macro_catalog(&host, page, WIKI);
        assert_eq!(macros.len(), 1);
        assert_eq!(macros[0].name, "Bar_Baz");
        assert_eq!(
            macros[0].icon.as_deref(),
            Some("https://wiki.example.org/Special:Redirect/file/Macroicon.png")
        );
    }

    #[test]
    fn malformed_catalog_entries_are_skipped() {
        let dir = TempDir::new().unwrap();
        let host = test_host(&dir);
        let page = "{{MacroLink|broken\n{{MacroLink|Macro Ok|Macro Ok}}: fine\n";

        let macros = parse_macro_catalog(&host, page, WIKI);
        assert_eq!(macros.len(), 1);
        assert_eq!(macros[0].name, "Ok");
    }

    #[test]
    fn code_template_wins_over_pre_block() {
        let page = "{{MacroCode|code=print('hi')\n}}\n<pre>legacy</pre>";
        assert_eq!(
            extract_macro_code(page),
            Some(MacroSource::Code("print('hi')".to_string()))
        );
    }

    #[test]
    fn pre_block_is_the_fallback() {
        let page = "Intro\n<pre>\nprint('old school')\n</pre>\n";
        assert_eq!(
            extract_macro_code(page),
            Some(MacroSource::Code("print('old school')\n".to_string()))
        );
    }

    #[test]
    fn external_link_is_reported_not_extracted() {
        let page = "{{Codeextralink|https://example.org/macro.py}}";
        assert_eq!(
            extract_macro_code(page),
            Some(MacroSource::ExternalLink(
                "https://example.org/macro.py".to_string()
            ))
        );
        assert_eq!(extract_macro_code("no code here"), None);
    }

    #[test]
    fn redirect_target_is_detected() {
        let caps = REDIRECT.captures("#REDIRECT [[Macro Other Name]]").unwrap();
        assert_eq!(&caps["target"], "Macro Other Name");
        assert!(!REDIRECT.is_match("regular content"));
    }

    #[test]
    fn mod_index_rows_are_keyed_by_repository() {
        let table = "\
{| class=\"wikitable\"
! Icon !! Name !! Topics !! Description !! Authors !! Code !! Flag
|-
| [[File:WidgetsIcon.svg|32px]]
| [[Widgets Workbench|Widgets]]
| CAD/CAM, Analysis
| Makes widgets
| alice
| https://github.com/acme/Widgets/
|-
|
| [[Plain]]
|
| Spans
  two lines
| bob
| https://github.com/acme/Plain.git
| obsolete
|}
";
        let index = parse_mod_index(table, WIKI);
        assert_eq!(index.len(), 2);

        let widgets = &index["https://github.com/acme/Widgets"];
        assert_eq!(widgets.title, "Widgets");
        assert_eq!(widgets.name, "Widgets Workbench");
        assert_eq!(widgets.categories.as_deref(), Some("CAD/CAM, Analysis"));
        assert_eq!(widgets.author.as_deref(), Some("alice"));
        assert_eq!(widgets.flag, None);
        assert_eq!(
            widgets.icon.as_deref(),
            Some("https://wiki.example.org/Special:Redirect/file/WidgetsIcon.svg")
        );

        let plain = &index["https://github.com/acme/Plain"];
        assert_eq!(plain.description.as_deref(), Some("Spans two lines"));
        assert_eq!(plain.flag.as_deref(), Some("obsolete"));
        assert_eq!(plain.icon, None);
    }

    #[test]
    fn page_content_is_unwrapped_from_api_reply() {
        let body = r#"{"query":{"pages":[{"revisions":[{"slots":{"main":{"content":"hello"}}}]}]}}"#;
        let response: WikiQueryResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.page_content().as_deref(), Some("hello"));

        let empty: WikiQueryResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.page_content(), None);
    }
}
