/// An App Store primary genre.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: &'static str,
}

/// Top-level App Store genres used to seed category jobs. Names match the
/// `primaryGenreName` the search endpoint reports.
pub const CATEGORIES: &[Category] = &[
    Category { id: 6000, name: "Business" },
    Category { id: 6001, name: "Weather" },
    Category { id: 6002, name: "Utilities" },
    Category { id: 6003, name: "Travel" },
    Category { id: 6004, name: "Sports" },
    Category { id: 6005, name: "Social Networking" },
    Category { id: 6006, name: "Reference" },
    Category { id: 6007, name: "Productivity" },
    Category { id: 6008, name: "Photo & Video" },
    Category { id: 6009, name: "News" },
    Category { id: 6010, name: "Navigation" },
    Category { id: 6011, name: "Music" },
    Category { id: 6012, name: "Lifestyle" },
    Category { id: 6013, name: "Health & Fitness" },
    Category { id: 6014, name: "Games" },
    Category { id: 6015, name: "Finance" },
    Category { id: 6016, name: "Entertainment" },
    Category { id: 6017, name: "Education" },
    Category { id: 6018, name: "Books" },
    Category { id: 6020, name: "Medical" },
    Category { id: 6021, name: "Magazines & Newspapers" },
    Category { id: 6022, name: "Catalogs" },
    Category { id: 6023, name: "Food & Drink" },
    Category { id: 6024, name: "Shopping" },
];

pub fn find(id: i64) -> Option<Category> {
    CATEGORIES.iter().copied().find(|c| c.id == id)
}

/// Resolve a list of ids, failing on the first unknown one.
pub fn resolve(ids: &[i64]) -> Result<Vec<Category>, crate::error::AppError> {
    ids.iter()
        .map(|&id| {
            find(id).ok_or_else(|| {
                crate::error::AppError::ConfigError(format!("unknown category id {id}"))
            })
        })
        .collect()
}
