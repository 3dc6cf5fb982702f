/** A macro that defines a function for an enum, calling the same function on
all enum variants.

For example, the usage:

```ignore
enum_passthrough!(self, (barrier), GlobalSingle, HostSingle, ThreadSingle;
    pub fn push(&self, barrier: EmulatedTime)
);
```

expands to:

```ignore
pub fn push(&self, barrier: EmulatedTime) {
    match self {
        Self::GlobalSingle(x) => x.push(barrier),
        Self::HostSingle(x) => x.push(barrier),
        Self::ThreadSingle(x) => x.push(barrier),
    }
}
```
**/
macro_rules! enum_passthrough {
    ($self:ident, $args2:tt, $($variant:ident),+; $(#[$($mac:tt)+])? $v:vis fn $name:ident $args:tt $(-> $($rv:tt)+)?) => {
        $(#[$($mac)+])?
        $v fn $name $args $(-> $($rv)+)? {
            match $self {
                $(
                Self::$variant(x) => x.$name $args2,
                )*
            }
        }
    };
}
