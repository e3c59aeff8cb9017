macro_rules! setters {
    ($($f:ident: $t:ty,)+) => {$(
        #[must_use]
        #[inline]
        pub fn $f(mut self, $f: $t) -> Self {
            self.$f = $f;
            self
        }
    )+};

    (@into $($f:ident: $t:ty,)+) => {$(
        #[must_use]
        #[inline]
        pub fn $f(mut self, $f: impl Into<$t>) -> Self {
            self.$f = $f.into();
            self
        }
    )+};

    (@some $($f:ident: $t:ty,)+) => {$(
        #[must_use]
        #[inline]
        pub fn $f(mut self, $f: $t) -> Self {
            self.$f = Some($f);
            self
        }
    )+};

    (@option $($f:ident: $t:ty,)+) => {$(
        #[must_use]
        #[inline]
        pub fn $f(mut self, $f: impl Into<$t>) -> Self {
            self.$f = Some($f.into());
            self
        }
    )+};
}
