use eframe::egui::Vec2;

pub const ROOT_ID: &str = "root";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Root,
    Organization,
    Repository,
    Branch,
    Contributor,
    File,
    Directory,
}

impl NodeKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Organization => "organization",
            Self::Repository => "repository",
            Self::Branch => "branch",
            Self::Contributor => "contributor",
            Self::File => "file",
            Self::Directory => "directory",
        }
    }

    fn base_radius(self) -> f32 {
        match self {
            Self::Root => 18.0,
            Self::Organization => 24.0,
            Self::Repository => 18.0,
            Self::Branch => 13.0,
            Self::Contributor => 9.0,
            Self::Directory => 9.0,
            Self::File => 6.0,
        }
    }
}

/// Color and filter grouping. Files are grouped by extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Root,
    Organization,
    Repository,
    Branch,
    Contributor,
    Directory,
    Python,
    JavaScript,
    Config,
    Documentation,
    Text,
    Other,
}

impl Category {
    pub const ALL: [Self; 12] = [
        Self::Root,
        Self::Organization,
        Self::Repository,
        Self::Branch,
        Self::Contributor,
        Self::Directory,
        Self::Python,
        Self::JavaScript,
        Self::Config,
        Self::Documentation,
        Self::Text,
        Self::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Organization => "organization",
            Self::Repository => "repository",
            Self::Branch => "branch",
            Self::Contributor => "contributor",
            Self::Directory => "directory",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::Config => "config",
            Self::Documentation => "documentation",
            Self::Text => "text",
            Self::Other => "other",
        }
    }

    pub fn for_file(name: &str) -> Self {
        let extension = name
            .rsplit_once('.')
            .map(|(_, extension)| extension.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "py" => Self::Python,
            "js" => Self::JavaScript,
            "json" | "yaml" | "yml" => Self::Config,
            "md" => Self::Documentation,
            "txt" => Self::Text,
            _ => Self::Other,
        }
    }
}

/// Kind-specific attributes. The variant is the node's kind.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Root,
    Organization {
        login: String,
        description: Option<String>,
        avatar_url: Option<String>,
    },
    Repository {
        full_name: String,
        description: Option<String>,
        language: Option<String>,
        default_branch: Option<String>,
        stars: u64,
        /// Bytes, as reported by GitHub (which counts kilobytes).
        size: u64,
    },
    Branch {
        repository: String,
        name: String,
        protected: bool,
        commit_sha: Option<String>,
    },
    Contributor {
        scope: String,
        login: String,
        avatar_url: Option<String>,
        /// Repository-wide count. Branch listings only weight their edge, so a
        /// contributor first seen on a branch has `None` here.
        contributions: Option<u64>,
    },
    File {
        repository: String,
        reference: Option<String>,
        path: String,
        size: u64,
    },
    Directory {
        repository: String,
        reference: Option<String>,
        path: String,
    },
}

impl Payload {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Root => NodeKind::Root,
            Self::Organization { .. } => NodeKind::Organization,
            Self::Repository { .. } => NodeKind::Repository,
            Self::Branch { .. } => NodeKind::Branch,
            Self::Contributor { .. } => NodeKind::Contributor,
            Self::File { .. } => NodeKind::File,
            Self::Directory { .. } => NodeKind::Directory,
        }
    }

    /// Base radius for the kind, grown by the log of contributions or bytes.
    pub fn radius(&self) -> f32 {
        let base = self.kind().base_radius();
        let bonus = match self {
            Self::Contributor { contributions, .. } => {
                (contributions.unwrap_or(0) as f32).ln_1p() * 1.4
            }
            Self::File { size, .. } => (*size as f32).ln_1p() * 0.45,
            Self::Repository { stars, .. } => (*stars as f32).ln_1p() * 0.8,
            _ => 0.0,
        };
        base + bonus.min(base * 1.25)
    }

    /// The payload a node keeps when `fresh` is merged over it. A fresh
    /// contributor record without a repository-wide count keeps the old one.
    pub fn merged_with(&self, fresh: Payload) -> Payload {
        match (self, fresh) {
            (
                Self::Contributor {
                    contributions: Some(known),
                    ..
                },
                Self::Contributor {
                    scope,
                    login,
                    avatar_url,
                    contributions: None,
                },
            ) => Self::Contributor {
                scope,
                login,
                avatar_url,
                contributions: Some(*known),
            },
            (_, fresh) => fresh,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub radius: f32,
    pub category: Category,
    pub position: Option<Vec2>,
    pub pinned: Option<Vec2>,
    pub payload: Payload,
}

impl Node {
    pub fn new(id: String, label: String, category: Category, payload: Payload) -> Self {
        Self {
            id,
            label,
            radius: payload.radius(),
            category,
            position: None,
            pinned: None,
            payload,
        }
    }

    pub fn root() -> Self {
        Self::new(
            ROOT_ID.to_owned(),
            "GitHub".to_owned(),
            Category::Root,
            Payload::Root,
        )
    }

    pub fn kind(&self) -> NodeKind {
        self.payload.kind()
    }

    /// Where the node is drawn: the pin wins over the simulated position.
    pub fn current_position(&self) -> Option<Vec2> {
        self.pinned.or(self.position)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Membership,
    Owns,
    Member,
    Branch,
    Contributed,
    Contains,
}

impl EdgeKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Membership => "membership",
            Self::Owns => "owns",
            Self::Member => "member",
            Self::Branch => "branch",
            Self::Contributed => "contributed",
            Self::Contains => "contains",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    pub weight: f32,
}

impl Edge {
    pub fn new(source: &str, target: &str, kind: EdgeKind, weight: f32) -> Self {
        Self {
            source: source.to_owned(),
            target: target.to_owned(),
            kind,
            weight,
        }
    }

    pub fn touches(&self, id: &str) -> bool {
        self.source == id || self.target == id
    }

    pub(super) fn key(&self) -> EdgeKey {
        (self.source.clone(), self.target.clone(), self.kind)
    }
}

pub(super) type EdgeKey = (String, String, EdgeKind);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_category_follows_extension() {
        assert_eq!(Category::for_file("setup.py"), Category::Python);
        assert_eq!(Category::for_file("index.JS"), Category::JavaScript);
        assert_eq!(Category::for_file("ci.yml"), Category::Config);
        assert_eq!(Category::for_file("README.md"), Category::Documentation);
        assert_eq!(Category::for_file("LICENSE"), Category::Other);
    }

    #[test]
    fn radius_grows_with_contributions_but_is_capped() {
        let small = Payload::Contributor {
            scope: "acme/api".to_owned(),
            login: "ana".to_owned(),
            avatar_url: None,
            contributions: Some(1),
        };
        let huge = Payload::Contributor {
            scope: "acme/api".to_owned(),
            login: "bo".to_owned(),
            avatar_url: None,
            contributions: Some(10_000_000),
        };

        assert!(huge.radius() > small.radius());
        assert!(huge.radius() <= NodeKind::Contributor.base_radius() * 2.25);
    }

    #[test]
    fn branch_listing_keeps_repository_wide_count() {
        let known = Payload::Contributor {
            scope: "acme/api".to_owned(),
            login: "ana".to_owned(),
            avatar_url: None,
            contributions: Some(500),
        };
        let from_branch = Payload::Contributor {
            scope: "acme/api".to_owned(),
            login: "ana".to_owned(),
            avatar_url: Some("https://avatars.example/ana".to_owned()),
            contributions: None,
        };

        let merged = known.merged_with(from_branch);
        assert!(matches!(
            &merged,
            Payload::Contributor {
                contributions: Some(500),
                avatar_url: Some(_),
                ..
            }
        ));

        let recount = Payload::Contributor {
            scope: "acme/api".to_owned(),
            login: "ana".to_owned(),
            avatar_url: None,
            contributions: Some(510),
        };
        assert_eq!(merged.merged_with(recount.clone()), recount);
    }

    #[test]
    fn pin_overrides_simulated_position() {
        let mut node = Node::root();
        node.position = Some(Vec2::new(1.0, 2.0));
        assert_eq!(node.current_position(), Some(Vec2::new(1.0, 2.0)));

        node.pinned = Some(Vec2::new(5.0, 6.0));
        assert_eq!(node.current_position(), Some(Vec2::new(5.0, 6.0)));
    }
}
