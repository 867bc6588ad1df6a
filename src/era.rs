//! Document format eras.
//!
//! The printed report layout changed after the first volume, so a few field
//! patterns (Coverage, Continuity) differ between eras.

/// First survey year printed in the modern layout.
pub const DEFAULT_MODERN_FROM: i32 = 1989;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Era {
    Early,
    Modern,
}

impl Era {
    pub fn for_year(year: i32, modern_from: i32) -> Self {
        if year < modern_from {
            Era::Early
        } else {
            Era::Modern
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_year_is_modern() {
        assert_eq!(Era::for_year(1988, DEFAULT_MODERN_FROM), Era::Early);
        assert_eq!(Era::for_year(1989, DEFAULT_MODERN_FROM), Era::Modern);
        assert_eq!(Era::for_year(1995, DEFAULT_MODERN_FROM), Era::Modern);
    }
}
