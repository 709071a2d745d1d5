//! Record identifiers.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

macro_rules! record_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash,
            Serialize, Deserialize, Display, From,
        )]
        #[display("{_0}")]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            pub const fn as_i64(self) -> i64 {
                self.0
            }

            /// The identity immediately following this one.
            pub const fn next(self) -> Self {
                Self(self.0 + 1)
            }
        }
    };
}

record_id!(
    /// Identity of a change record. Assigned at durable insertion,
    /// strictly increasing, never reused.
    ChangeId
);
record_id!(
    /// Identity of a frozen source stamp.
    SourceStampId
);
record_id!(
    /// Identity of a build set (one source stamp, N build requests).
    BuildSetId
);
record_id!(
    /// Identity of a single build request row.
    BuildRequestId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_and_next() {
        let a = ChangeId::new(3);
        assert!(a < a.next());
        assert_eq!(a.next().as_i64(), 4);
        assert_eq!(ChangeId::default().as_i64(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(BuildSetId::new(17).to_string(), "17");
    }
}
