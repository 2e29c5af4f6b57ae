/*!
 * Binary-Safe Command Arguments
 *
 * Commands are sent as arrays of length-prefixed byte strings, so any Rust
 * value that can be rendered to bytes can be a command argument. `ToArg`
 * renders a single value; `ToArgs` flattens tuples, slices and vectors of
 * arguments into the field list that the encoder consumes.
 */

use bytes::Bytes;
use std::borrow::Cow;

/// A single binary-safe command argument
pub trait ToArg {
    fn to_arg(&self) -> Cow<'_, [u8]>;
}

/// A list of command arguments, appended in order
pub trait ToArgs {
    fn push_args<'a>(&'a self, out: &mut Vec<Cow<'a, [u8]>>);
}

impl ToArg for [u8] {
    #[inline]
    fn to_arg(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self)
    }
}

impl<const N: usize> ToArg for [u8; N] {
    #[inline]
    fn to_arg(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(&self[..])
    }
}

impl ToArg for Vec<u8> {
    #[inline]
    fn to_arg(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self)
    }
}

impl ToArg for Bytes {
    #[inline]
    fn to_arg(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self)
    }
}

impl ToArg for str {
    #[inline]
    fn to_arg(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self.as_bytes())
    }
}

impl ToArg for String {
    #[inline]
    fn to_arg(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self.as_bytes())
    }
}

impl ToArg for Cow<'_, [u8]> {
    #[inline]
    fn to_arg(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self.as_ref())
    }
}

impl ToArg for char {
    fn to_arg(&self) -> Cow<'_, [u8]> {
        let mut buf = [0u8; 4];
        Cow::Owned(self.encode_utf8(&mut buf).as_bytes().to_vec())
    }
}

impl<T: ToArg + ?Sized> ToArg for &T {
    #[inline]
    fn to_arg(&self) -> Cow<'_, [u8]> {
        (**self).to_arg()
    }
}

macro_rules! int_to_arg {
    ($($t:ty),*) => {
        $(
            impl ToArg for $t {
                fn to_arg(&self) -> Cow<'_, [u8]> {
                    Cow::Owned(self.to_string().into_bytes())
                }
            }
        )*
    };
}

int_to_arg!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl ToArg for f64 {
    /// Infinities are spelled the way sorted-set commands expect them
    fn to_arg(&self) -> Cow<'_, [u8]> {
        let s = if self.is_infinite() {
            if *self > 0.0 { "+inf".to_string() } else { "-inf".to_string() }
        } else {
            self.to_string()
        };
        Cow::Owned(s.into_bytes())
    }
}

impl ToArgs for () {
    fn push_args<'a>(&'a self, _out: &mut Vec<Cow<'a, [u8]>>) {}
}

impl<T: ToArg> ToArgs for [T] {
    fn push_args<'a>(&'a self, out: &mut Vec<Cow<'a, [u8]>>) {
        out.extend(self.iter().map(ToArg::to_arg));
    }
}

impl<T: ToArg, const N: usize> ToArgs for [T; N] {
    fn push_args<'a>(&'a self, out: &mut Vec<Cow<'a, [u8]>>) {
        out.extend(self.iter().map(ToArg::to_arg));
    }
}

impl<T: ToArg> ToArgs for Vec<T> {
    fn push_args<'a>(&'a self, out: &mut Vec<Cow<'a, [u8]>>) {
        out.extend(self.iter().map(ToArg::to_arg));
    }
}

impl<T: ToArgs + ?Sized> ToArgs for &T {
    fn push_args<'a>(&'a self, out: &mut Vec<Cow<'a, [u8]>>) {
        (**self).push_args(out)
    }
}

macro_rules! tuple_to_args {
    ($($name:ident)+) => {
        impl<$($name: ToArg),+> ToArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn push_args<'a>(&'a self, out: &mut Vec<Cow<'a, [u8]>>) {
                let ($($name,)+) = self;
                $(out.push($name.to_arg());)+
            }
        }
    };
}

tuple_to_args!(A);
tuple_to_args!(A B);
tuple_to_args!(A B C);
tuple_to_args!(A B C D);
tuple_to_args!(A B C D E);
tuple_to_args!(A B C D E F);
tuple_to_args!(A B C D E F G);
tuple_to_args!(A B C D E F G H);
