//! Copy buffer sizing scaled by file size and capped by available memory.

use once_cell::sync::OnceCell;

const KB: usize = 1024;
const MB: usize = 1024 * KB;

pub struct BufferSizer {
    max_buffer_size: usize,
    min_buffer_size: usize,
    cached_available_memory: OnceCell<u64>,
}

impl BufferSizer {
    pub fn new() -> Self {
        BufferSizer {
            max_buffer_size: 8 * MB,
            min_buffer_size: 256 * KB,
            cached_available_memory: OnceCell::new(),
        }
    }

    fn get_available_memory() -> u64 {
        use sysinfo::System;
        let mut sys = System::new();
        sys.refresh_memory();
        let avail = sys.available_memory();
        if avail == 0 {
            512_u64 * 1024 * 1024
        } else {
            avail
        }
    }

    /// Buffer size for streaming a file of `file_size` bytes.
    ///
    /// Small files get the minimum, files up to 100 MiB a fixed 1 MiB, and
    /// anything larger scales linearly toward the maximum over the next 900 MiB.
    /// Every worker holds one buffer, so the result is capped at 2% of
    /// available memory.
    pub fn calculate_buffer_size(&self, file_size: u64) -> usize {
        let available_memory = *self
            .cached_available_memory
            .get_or_init(Self::get_available_memory);

        let small_limit = MB as u64;
        let medium_limit = 100 * MB as u64;
        let base_size = MB;
        let optimal_size = if file_size < small_limit {
            self.min_buffer_size
        } else if file_size <= medium_limit {
            base_size
        } else {
            let range = self.max_buffer_size.saturating_sub(base_size);
            let span: u64 = 900 * MB as u64;
            let over = file_size.saturating_sub(medium_limit).min(span);
            let incr = (range as u64).saturating_mul(over).saturating_div(span) as usize;
            base_size.saturating_add(incr)
        };

        let memory_limit = (available_memory / 50) as usize;
        optimal_size.min(memory_limit).max(8 * KB)
    }
}

impl Default for BufferSizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl BufferSizer {
        fn new_with_memory(mock_bytes: u64) -> Self {
            let s = BufferSizer::new();
            let _ = s.cached_available_memory.set(mock_bytes);
            s
        }
    }

    #[test]
    fn small_files_use_minimum() {
        let sizer = BufferSizer::new_with_memory(8_u64 * 1024 * 1024 * 1024);
        assert_eq!(sizer.calculate_buffer_size(4 * KB as u64), 256 * KB);
    }

    #[test]
    fn large_files_scale_to_maximum() {
        let sizer = BufferSizer::new_with_memory(16_u64 * 1024 * 1024 * 1024);
        assert_eq!(sizer.calculate_buffer_size(50 * MB as u64), MB);
        assert_eq!(sizer.calculate_buffer_size(4 * 1024 * MB as u64), 8 * MB);
        let mid = sizer.calculate_buffer_size(550 * MB as u64);
        assert!(mid > MB && mid < 8 * MB);
    }

    #[test]
    fn low_memory_caps_buffer() {
        let sizer = BufferSizer::new_with_memory(64 * MB as u64);
        let size = sizer.calculate_buffer_size(4 * 1024 * MB as u64);
        assert!(size <= (64 * MB) / 50);
        assert!(size >= 8 * KB);
    }
}
