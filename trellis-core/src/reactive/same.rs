//! Change detection.
//!
//! Writes only notify when the new value differs from the old one under
//! [`Same`]. For floats this is not `==`: `NaN` is the same as `NaN`, and
//! `+0.0` is not the same as `-0.0`. Shared pointers compare by identity.

use std::rc::Rc;
use std::sync::Arc;

/// Identity-style equality used to decide whether a value changed.
pub trait Same {
    fn same(&self, other: &Self) -> bool;
}

/// Free-function form of [`Same::same`].
pub fn same<T: Same + ?Sized>(a: &T, b: &T) -> bool {
    a.same(b)
}

/// Equality function stored by signals and computeds.
pub type EqualityFn<T> = fn(&T, &T) -> bool;

macro_rules! same_via_eq {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Same for $ty {
                #[inline]
                fn same(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

same_via_eq!(
    (), bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, str,
    String,
);

impl Same for f32 {
    #[inline]
    fn same(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits() || (self.is_nan() && other.is_nan())
    }
}

impl Same for f64 {
    #[inline]
    fn same(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits() || (self.is_nan() && other.is_nan())
    }
}

impl<T: Same> Same for Option<T> {
    fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: Same> Same for [T] {
    fn same(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.same(b))
    }
}

impl<T: Same, const N: usize> Same for [T; N] {
    fn same(&self, other: &Self) -> bool {
        self[..].same(&other[..])
    }
}

impl<T: Same> Same for Vec<T> {
    fn same(&self, other: &Self) -> bool {
        self[..].same(&other[..])
    }
}

impl<T: Same + ?Sized> Same for Box<T> {
    fn same(&self, other: &Self) -> bool {
        (**self).same(&**other)
    }
}

impl<T: Same + ?Sized> Same for &T {
    fn same(&self, other: &Self) -> bool {
        (**self).same(&**other)
    }
}

impl<T: ?Sized> Same for Rc<T> {
    fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl<T: ?Sized> Same for Arc<T> {
    fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

macro_rules! same_for_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Same),+> Same for ($($name,)+) {
            fn same(&self, other: &Self) -> bool {
                $(self.$idx.same(&other.$idx))&&+
            }
        }
    };
}

same_for_tuple!(A: 0);
same_for_tuple!(A: 0, B: 1);
same_for_tuple!(A: 0, B: 1, C: 2);
same_for_tuple!(A: 0, B: 1, C: 2, D: 3);
