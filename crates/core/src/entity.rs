//! Named entities and their graph node categories

/// Graph node categories.
///
/// Extraction produces an open set of entity tags; the graph collapses
/// them onto this fixed set, with `Entity` as the generic fallback, so
/// node labels never come from untrusted extractor text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeCategory {
    Person,
    Organization,
    Place,
    Date,
    Quantity,
    Event,
    Work,
    Law,
    Product,
    /// Generic fallback for unmapped tags
    Entity,
}

impl NodeCategory {
    /// Map a raw entity tag (PERSON, ORG, GPE, ...) to its category.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "PERSON" | "PER" => Self::Person,
            "ORG" | "ORGANIZATION" => Self::Organization,
            "GPE" | "LOC" | "LOCATION" | "PLACE" | "FAC" => Self::Place,
            "DATE" | "TIME" => Self::Date,
            "CARDINAL" | "ORDINAL" | "QUANTITY" | "MONEY" | "PERCENT" => Self::Quantity,
            "EVENT" => Self::Event,
            "WORK_OF_ART" | "WORK" => Self::Work,
            "LAW" => Self::Law,
            "PRODUCT" => Self::Product,
            _ => Self::Entity,
        }
    }
}

impl std::fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NodeCategory::Person => "Person",
            NodeCategory::Organization => "Organization",
            NodeCategory::Place => "Place",
            NodeCategory::Date => "Date",
            NodeCategory::Quantity => "Quantity",
            NodeCategory::Event => "Event",
            NodeCategory::Work => "Work",
            NodeCategory::Law => "Law",
            NodeCategory::Product => "Product",
            NodeCategory::Entity => "Entity",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_mapping() {
        assert_eq!(NodeCategory::from_tag("PERSON"), NodeCategory::Person);
        assert_eq!(NodeCategory::from_tag("ORG"), NodeCategory::Organization);
        assert_eq!(NodeCategory::from_tag("gpe"), NodeCategory::Place);
        assert_eq!(NodeCategory::from_tag("MONEY"), NodeCategory::Quantity);
        assert_eq!(NodeCategory::from_tag("WORK_OF_ART"), NodeCategory::Work);
    }

    #[test]
    fn test_unmapped_tag_defaults_to_generic() {
        assert_eq!(NodeCategory::from_tag("NORP"), NodeCategory::Entity);
        assert_eq!(NodeCategory::from_tag(""), NodeCategory::Entity);
        assert_eq!(NodeCategory::from_tag("LANGUAGE"), NodeCategory::Entity);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(NodeCategory::Person.to_string(), "Person");
        assert_eq!(NodeCategory::Entity.to_string(), "Entity");
    }
}
