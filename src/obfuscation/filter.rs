//! Class name eligibility.

use crate::build::Config;

/// Include and exclude lists of internal name prefixes.
///
/// A class is admitted when the include list is empty or one of its prefixes matches,
/// and no exclude prefix matches. Prefixes may be written with dots (`com.app`) or
/// slashes (`com/app`).
///
/// # Examples
///
/// ```rust
/// use veil::Filter;
///
/// let filter = Filter::new(["com.app.secret"], Vec::<String>::new());
/// assert!(filter.admits("com/app/secret/Foo"));
/// assert!(!filter.admits("com/app/other/Bar"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Filter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl Filter {
    /// Creates a filter, normalizing every prefix to internal form.
    pub fn new<I, E>(include: I, exclude: E) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Filter {
            include: include.into_iter().map(|p| normalize(p.as_ref())).collect(),
            exclude: exclude.into_iter().map(|p| normalize(p.as_ref())).collect(),
        }
    }

    /// Creates the filter described by `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.include, &config.exclude)
    }

    /// Normalized include prefixes.
    #[must_use]
    pub fn include(&self) -> &[String] {
        &self.include
    }

    /// Normalized exclude prefixes.
    #[must_use]
    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    /// Returns `true` if the class with internal name `name` should be transformed.
    #[must_use]
    pub fn admits(&self, name: &str) -> bool {
        let included = self.include.is_empty()
            || self.include.iter().any(|prefix| name.starts_with(prefix.as_str()));
        included && !self.exclude.iter().any(|prefix| name.starts_with(prefix.as_str()))
    }
}

fn normalize(prefix: &str) -> String {
    prefix.trim().replace('.', "/")
}
