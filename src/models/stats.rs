/// Memory counters read from `/proc/<pid>/status`, all in kB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Peak virtual memory size
    pub vm_peak: u64,

    /// Current virtual memory size
    pub vm_size: u64,

    /// Peak resident set size ("high water mark")
    pub vm_hwm: u64,

    /// Current resident set size
    pub vm_rss: u64,
}

/// One of the status fields tracked in [`MemoryStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryField {
    VmPeak,
    VmSize,
    VmHwm,
    VmRss,
}

impl MemoryField {
    /// Same order as the kernel writes them into the status file. The status
    /// scan walks this list with a cursor, so the order matters.
    pub const ORDERED: [MemoryField; 4] = [
        MemoryField::VmPeak,
        MemoryField::VmSize,
        MemoryField::VmHwm,
        MemoryField::VmRss,
    ];

    pub fn key(self) -> &'static str {
        match self {
            MemoryField::VmPeak => "VmPeak",
            MemoryField::VmSize => "VmSize",
            MemoryField::VmHwm => "VmHWM",
            MemoryField::VmRss => "VmRSS",
        }
    }

    /// If `line` is this field's status line, returns the value in kB.
    pub fn parse_line(self, line: &str) -> Option<u64> {
        let rest = line.strip_prefix(self.key())?.strip_prefix(':')?;
        rest.split_whitespace().next()?.parse().ok()
    }
}

impl MemoryStats {
    pub fn set(&mut self, field: MemoryField, value: u64) {
        match field {
            MemoryField::VmPeak => self.vm_peak = value,
            MemoryField::VmSize => self.vm_size = value,
            MemoryField::VmHwm => self.vm_hwm = value,
            MemoryField::VmRss => self.vm_rss = value,
        }
    }
}
