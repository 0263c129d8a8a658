/// Photo used when a theme id is not part of the catalog.
pub const DEFAULT_FALLBACK_IMAGE: &str =
    "https://images.unsplash.com/photo-1488751045188-3c55bbf9a3fa?w=800&h=600&fit=crop";

/// The fixed theme catalog offered by the story form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Theme {
    Friendship,
    Adventure,
    Magic,
    Animals,
    Space,
    Ocean,
    Forest,
    School,
}

impl Theme {
    /// Theme id as submitted by the form
    pub fn id(&self) -> &'static str {
        match self {
            Self::Friendship => "friendship",
            Self::Adventure => "adventure",
            Self::Magic => "magic",
            Self::Animals => "animals",
            Self::Space => "space",
            Self::Ocean => "ocean",
            Self::Forest => "forest",
            Self::School => "school",
        }
    }

    /// Button label shown in the theme grid
    pub fn label(&self) -> &'static str {
        match self {
            Self::Friendship => "Best Buddies Forever!",
            Self::Adventure => "Let's Go Exploring!",
            Self::Magic => "Magical Surprises!",
            Self::Animals => "Furry Friends Fun!",
            Self::Space => "Zoom to the Stars!",
            Self::Ocean => "Splashy Sea Fun!",
            Self::Forest => "Woodland Wonders!",
            Self::School => "Learning is Fun!",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Friendship => "🤝",
            Self::Adventure => "🗺️",
            Self::Magic => "✨",
            Self::Animals => "🐾",
            Self::Space => "🚀",
            Self::Ocean => "🌊",
            Self::Forest => "🌳",
            Self::School => "🏫",
        }
    }

    /// Phrase woven into the templated fallback story
    pub fn story_phrase(&self) -> &'static str {
        match self {
            Self::Friendship => "making a brand new best friend",
            Self::Adventure => "a big exploring adventure",
            Self::Magic => "a wobbly magic wand that sneezed sparkles",
            Self::Animals => "a parade of very chatty animals",
            Self::Space => "a rocket ride to the giggling moon",
            Self::Ocean => "a splashy swim with a dancing crab",
            Self::Forest => "a hide-and-seek game with the forest owls",
            Self::School => "the silliest school day ever",
        }
    }

    /// Static photo used as the last image fallback tier
    pub fn fallback_image_url(&self) -> &'static str {
        match self {
            Self::Friendship => "https://images.unsplash.com/photo-1516589178581-6cd7833ae3b2?w=800&h=600&fit=crop",
            Self::Adventure => "https://images.unsplash.com/photo-1501785888041-af3ef285b470?w=800&h=600&fit=crop",
            Self::Magic => "https://images.unsplash.com/photo-1518709268805-4e9042af9f23?w=800&h=600&fit=crop",
            Self::Animals => "https://images.unsplash.com/photo-1415369629372-26f2fe60c467?w=800&h=600&fit=crop",
            Self::Space => "https://images.unsplash.com/photo-1446776811953-b23d57bd21aa?w=800&h=600&fit=crop",
            Self::Ocean => "https://images.unsplash.com/photo-1507525428034-b723cf961d3e?w=800&h=600&fit=crop",
            Self::Forest => "https://images.unsplash.com/photo-1441974231531-c6227db76b6e?w=800&h=600&fit=crop",
            Self::School => "https://images.unsplash.com/photo-1523050854058-8df90110c9f1?w=800&h=600&fit=crop",
        }
    }

    /// Look a theme up by id. Unknown ids are not an error for callers;
    /// they fall back to generic phrasing and [`DEFAULT_FALLBACK_IMAGE`].
    pub fn from_id(id: &str) -> Option<Theme> {
        let id = id.trim();
        Self::all().into_iter().find(|t| t.id().eq_ignore_ascii_case(id))
    }

    /// All available themes
    pub fn all() -> [Theme; 8] {
        [
            Self::Friendship,
            Self::Adventure,
            Self::Magic,
            Self::Animals,
            Self::Space,
            Self::Ocean,
            Self::Forest,
            Self::School,
        ]
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::Adventure
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}
