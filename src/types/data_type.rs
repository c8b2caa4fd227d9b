use strum_macros::{Display, EnumString};

/// The compiler's type lattice: `{Boolean, Integer, Decimal, Number, String,
/// Timestamp, Any}`. Grounded in `compilation_context.h`'s `DataType` enum.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "PascalCase")]
pub enum DataType {
    Boolean,
    Integer,
    Decimal,
    Number,
    String,
    Timestamp,
    Any,
}

impl DataType {
    fn is_numeric(self) -> bool {
        matches!(self, DataType::Integer | DataType::Decimal | DataType::Number)
    }

    /// True if a value of `self` can be wired to an input of `target`
    /// without any cast node.
    pub fn is_compatible_with(self, target: DataType) -> bool {
        if self == DataType::Any || target == DataType::Any {
            return true;
        }
        if self == target {
            return true;
        }
        self.is_numeric() && target.is_numeric()
    }

    /// Name of the implicit cast transform needed to convert `self` into
    /// `target`, or `None` if no cast is known (§4.4).
    pub fn cast_to(self, target: DataType) -> Option<&'static str> {
        if self.is_compatible_with(target) {
            return None;
        }
        match (self, target) {
            // Boolean -> numeric: bool_to_num, implemented as static_cast_to_decimal
            // (or _integer when that is the concrete target).
            (DataType::Boolean, DataType::Integer) => Some("static_cast_to_integer"),
            (DataType::Boolean, t) if t.is_numeric() => Some("static_cast_to_decimal"),
            // numeric -> Boolean: num_to_bool, implemented as static_cast_to_boolean.
            (t, DataType::Boolean) if t.is_numeric() => Some("static_cast_to_boolean"),
            // Boolean -> String: stringify.
            (DataType::Boolean, DataType::String) => Some("stringify"),
            (_, DataType::String) => Some("stringify"),
            // Any other specific pairing: a static_cast_to_<target> variant.
            (DataType::String, DataType::Boolean) => Some("static_cast_to_boolean"),
            (_, DataType::Integer) => Some("static_cast_to_integer"),
            (_, DataType::Decimal) => Some("static_cast_to_decimal"),
            (_, DataType::Number) => Some("static_cast_to_number"),
            (_, DataType::Timestamp) => Some("static_cast_to_timestamp"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_family_is_mutually_compatible() {
        assert!(DataType::Integer.is_compatible_with(DataType::Decimal));
        assert!(DataType::Number.is_compatible_with(DataType::Integer));
        assert!(DataType::Decimal.cast_to(DataType::Number).is_none());
    }

    #[test]
    fn any_is_always_compatible() {
        assert!(DataType::Any.is_compatible_with(DataType::String));
        assert!(DataType::Boolean.is_compatible_with(DataType::Any));
    }

    #[test]
    fn bool_to_num_cast_is_static_cast_to_decimal() {
        assert_eq!(
            DataType::Boolean.cast_to(DataType::Number),
            Some("static_cast_to_decimal")
        );
        assert_eq!(
            DataType::Boolean.cast_to(DataType::Integer),
            Some("static_cast_to_integer")
        );
    }

    #[test]
    fn num_to_bool_cast_is_static_cast_to_boolean() {
        assert_eq!(
            DataType::Number.cast_to(DataType::Boolean),
            Some("static_cast_to_boolean")
        );
    }

    #[test]
    fn compatible_pairs_need_no_cast() {
        assert_eq!(DataType::Any.cast_to(DataType::Boolean), None);
        assert_eq!(DataType::Decimal.cast_to(DataType::Integer), None);
    }
}
