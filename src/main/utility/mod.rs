// modules with macros must be included before other modules
#[macro_use]
pub mod macros;

pub mod counter;
pub mod perf_timer;
pub mod time;

/// A debug-build canary word embedded in long-lived objects. Checks catch
/// use-after-free and type confusion early; in release builds the field and
/// the checks compile away.
#[derive(PartialEq, Eq)]
pub struct Magic<const M: u32> {
    #[cfg(debug_assertions)]
    magic: u32,
}

impl<const M: u32> Magic<M> {
    pub fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            magic: M,
        }
    }

    #[inline]
    pub fn debug_check(&self) {
        #[cfg(debug_assertions)]
        {
            assert_eq!(self.magic, M, "Magic canary check failed");
        }
    }
}

impl<const M: u32> Default for Magic<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const M: u32> std::ops::Drop for Magic<M> {
    fn drop(&mut self) {
        self.debug_check();
        #[cfg(debug_assertions)]
        {
            self.magic = 0;
        }
    }
}

impl<const M: u32> std::fmt::Debug for Magic<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Magic")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_check() {
        let magic: Magic<0xd1f24aa9> = Magic::new();
        magic.debug_check();
    }
}
