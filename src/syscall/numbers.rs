//! System call numbers
//!
//! The order of both enumerations is shared with the loader bit for bit.
//! Never reorder or insert in the middle: every compiled binary indexes the
//! loader's tables with these values.

/// Supervisor call number used for every trap-mode service.
pub const SYSCALL_SVC_NUMBER: u32 = 3;

/// Number of user-tier services.
pub const USER_SYSCALL_MAX: u32 = 9;

/// User-tier services, in table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum UserSyscall {
    Printf = 0,
    GetTemp = 1,
    IsPrint = 2,
    Strtol = 3,
    GetLed = 4,
    SetLed = 5,
    CopyFile = 6,
    GetFileSize = 7,
    Memset = 8,
}

impl UserSyscall {
    /// All services, in table order.
    pub const ALL: [Self; USER_SYSCALL_MAX as usize] = [
        Self::Printf,
        Self::GetTemp,
        Self::IsPrint,
        Self::Strtol,
        Self::GetLed,
        Self::SetLed,
        Self::CopyFile,
        Self::GetFileSize,
        Self::Memset,
    ];

    /// Slot in the user table.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Value placed in r0 for a trap.
    #[inline]
    pub const fn number(self) -> u32 {
        self as u32
    }

    pub fn from_number(number: u32) -> Option<Self> {
        Self::ALL.get(number as usize).copied()
    }

    /// Argument registers used after the service number.
    pub const fn arg_count(self) -> usize {
        match self {
            Self::GetTemp => 0,
            Self::IsPrint | Self::GetLed => 1,
            Self::Printf | Self::SetLed | Self::GetFileSize => 2,
            Self::Strtol | Self::CopyFile | Self::Memset => 3,
        }
    }
}

/// Privileged-tier services. Numbering continues after the user tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PrivSyscall {
    Exit = USER_SYSCALL_MAX,
}

impl PrivSyscall {
    /// First privileged number.
    pub const FIRST: u32 = USER_SYSCALL_MAX;

    /// Value placed in r0 for a trap.
    #[inline]
    pub const fn number(self) -> u32 {
        self as u32
    }

    /// Slot in the privileged table, which starts at zero.
    #[inline]
    pub const fn index(self) -> usize {
        (self as u32 - Self::FIRST) as usize
    }
}
