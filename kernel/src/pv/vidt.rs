//! Virtual IDT (spec.md §4.J "Virtual IDT and virtual IF")
//!
//! Handler eip + DPL for faults 0-19, the keyboard/timer IRQ slots, and
//! the platform's two syscall ranges, plus one pending-IRQ slot per
//! IRQ index.

pub const FAULT_START: usize = 0;
pub const IRQ_START: usize = 32;
pub const IRQ_END: usize = 34;
pub const SYSCALL_1_START: usize = 65;
pub const SYSCALL_1_END: usize = 117;
pub const SYSCALL_2_START: usize = 128;
pub const SYSCALL_2_END: usize = 135;

const FAULT_IRQ_LEN: usize = IRQ_END - FAULT_START;
const SYSCALL_1_LEN: usize = SYSCALL_1_END - SYSCALL_1_START;
const SYSCALL_2_LEN: usize = SYSCALL_2_END - SYSCALL_2_START;

#[derive(Debug, Clone, Copy, Default)]
pub struct VidtEntry {
    pub eip: u32,
    pub dpl: u8,
    pub installed: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualIrq {
    pub pending: bool,
    pub arg: u32,
}

pub struct VirtualIdt {
    fault_irq: [VidtEntry; FAULT_IRQ_LEN],
    pending_irq: [VirtualIrq; IRQ_END - IRQ_START],
    syscall_1: [VidtEntry; SYSCALL_1_LEN],
    syscall_2: [VidtEntry; SYSCALL_2_LEN],
}

impl VirtualIdt {
    pub fn new() -> Self {
        Self {
            fault_irq: [VidtEntry::default(); FAULT_IRQ_LEN],
            pending_irq: [VirtualIrq::default(); IRQ_END - IRQ_START],
            syscall_1: [VidtEntry::default(); SYSCALL_1_LEN],
            syscall_2: [VidtEntry::default(); SYSCALL_2_LEN],
        }
    }

    /// `setidt`: install a handler eip + DPL at virtual vector `index`.
    pub fn set(&mut self, index: usize, eip: u32, dpl: u8) -> bool {
        match self.entry_mut(index) {
            Some(entry) => {
                *entry = VidtEntry { eip, dpl, installed: true };
                true
            }
            None => false,
        }
    }

    pub fn get(&self, index: usize) -> Option<VidtEntry> {
        self.entry(index).filter(|e| e.installed)
    }

    pub fn pending_irq_mut(&mut self, index: usize) -> Option<&mut VirtualIrq> {
        if index < IRQ_START || index >= IRQ_END {
            return None;
        }
        Some(&mut self.pending_irq[index - IRQ_START])
    }

    fn entry(&self, index: usize) -> Option<&VidtEntry> {
        if index < IRQ_END {
            self.fault_irq.get(index - FAULT_START)
        } else if (SYSCALL_1_START..SYSCALL_1_END).contains(&index) {
            self.syscall_1.get(index - SYSCALL_1_START)
        } else if (SYSCALL_2_START..SYSCALL_2_END).contains(&index) {
            self.syscall_2.get(index - SYSCALL_2_START)
        } else {
            None
        }
    }

    fn entry_mut(&mut self, index: usize) -> Option<&mut VidtEntry> {
        if index < IRQ_END {
            self.fault_irq.get_mut(index - FAULT_START)
        } else if (SYSCALL_1_START..SYSCALL_1_END).contains(&index) {
            self.syscall_1.get_mut(index - SYSCALL_1_START)
        } else if (SYSCALL_2_START..SYSCALL_2_END).contains(&index) {
            self.syscall_2.get_mut(index - SYSCALL_2_START)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_fault_irq_and_syscall_ranges() {
        let mut idt = VirtualIdt::new();
        assert!(idt.set(14, 0x1000, 0));
        assert!(idt.set(32, 0x2000, 0));
        assert!(idt.set(70, 0x3000, 3));
        assert!(idt.set(130, 0x4000, 3));
        assert!(!idt.set(200, 0x5000, 3));

        assert_eq!(idt.get(14).unwrap().eip, 0x1000);
        assert_eq!(idt.get(32).unwrap().eip, 0x2000);
        assert_eq!(idt.get(70).unwrap().eip, 0x3000);
        assert_eq!(idt.get(130).unwrap().eip, 0x4000);
        assert!(idt.get(200).is_none());
    }
}
