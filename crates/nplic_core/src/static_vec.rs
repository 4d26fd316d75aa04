use core::mem::MaybeUninit;
use core::ops::Deref;
use core::slice;

/// A fixed-capacity vector that lives on the stack or in static memory.
///
/// Restricted to `Copy` elements so dropping it never has to walk the
/// initialized prefix.
pub struct StaticVec<T: Copy, const N: usize> {
    data: [MaybeUninit<T>; N],
    len: usize,
}

impl<T: Copy, const N: usize> Default for StaticVec<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy, const N: usize> StaticVec<T, N> {
    pub const fn new() -> Self {
        Self {
            // Safety: Array of MaybeUninit is always safe to create uninitialized.
            data: unsafe { MaybeUninit::uninit().assume_init() },
            len: 0,
        }
    }

    #[inline(always)]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Appends `item`, handing it back when the vector is full.
    #[inline(always)]
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.len < N {
            self.data[self.len].write(item);
            self.len += 1;
            Ok(())
        } else {
            Err(item)
        }
    }

    #[inline(always)]
    pub fn pop(&mut self) -> Option<T> {
        if self.len > 0 {
            self.len -= 1;
            unsafe {
                // Safety: We checked bounds. Item is initialized.
                Some(self.data.get_unchecked(self.len).assume_init_read())
            }
        } else {
            None
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.len == N
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        N
    }

    #[inline(always)]
    pub fn as_slice(&self) -> &[T] {
        unsafe {
            // Safety: data[0..len] is initialized.
            slice::from_raw_parts(self.data.as_ptr() as *const T, self.len)
        }
    }
}

impl<T: Copy, const N: usize> Deref for StaticVec<T, N> {
    type Target = [T];
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}
