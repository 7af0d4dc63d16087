//! Statement parameters.

use crate::Value;

/// Parameters bound to a single statement execution.
///
/// Placeholder syntax belongs to the database; the parameters only say
/// whether values bind by position or by name.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Params {
    /// The statement takes no parameters.
    #[default]
    None,
    /// Values bound in placeholder order.
    Positional(Vec<Value>),
    /// Values bound by placeholder name (without the leading sigil).
    Named(Vec<(String, Value)>),
}

impl Params {
    /// Builds positional parameters from anything convertible to values.
    pub fn positional<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }

    /// Builds named parameters from `(name, value)` pairs.
    ///
    /// A leading `:`, `@` or `$` on the name is accepted and stripped.
    pub fn named<I, K, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Into<Value>,
    {
        Self::Named(
            pairs
                .into_iter()
                .map(|(k, v)| {
                    let name: String = k.into();
                    let name = match name.strip_prefix([':', '@', '$']) {
                        Some(stripped) => stripped.to_string(),
                        None => name,
                    };
                    (name, v.into())
                })
                .collect(),
        )
    }

    /// Number of bound values.
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Positional(values) => values.len(),
            Self::Named(pairs) => pairs.len(),
        }
    }

    /// Returns `true` when no values are bound.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up a named value. Always `None` for positional parameters.
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Named(pairs) => pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Self::None
    }
}

impl<T: Into<Value>> From<Vec<T>> for Params {
    fn from(values: Vec<T>) -> Self {
        Self::positional(values)
    }
}

macro_rules! impl_from_tuple {
    ($($name:ident),+) => {
        impl<$($name: Into<Value>),+> From<($($name,)+)> for Params {
            #[allow(non_snake_case)]
            fn from(($($name,)+): ($($name,)+)) -> Self {
                Self::Positional(vec![$($name.into()),+])
            }
        }
    };
}

impl_from_tuple!(A);
impl_from_tuple!(A, B);
impl_from_tuple!(A, B, C);
impl_from_tuple!(A, B, C, D);
impl_from_tuple!(A, B, C, D, E);
impl_from_tuple!(A, B, C, D, E, F);
impl_from_tuple!(A, B, C, D, E, F, G);
impl_from_tuple!(A, B, C, D, E, F, G, H);
