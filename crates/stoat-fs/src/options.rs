//! Parsed operation options.

/// Open disposition decoded from a flag string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub truncate: bool,
    pub create: bool,
    pub create_new: bool,
}

impl OpenFlags {
    /// Decode a flag string (`"r"`, `"w+"`, `"ax"`, ...). Synchronous-mode
    /// suffixes (`"rs+"`) map to their plain counterparts.
    pub fn from_flag(flag: &str) -> Option<Self> {
        let (read, write, append, truncate, create, create_new) = match flag {
            "r" => (true, false, false, false, false, false),
            "r+" | "rs+" | "sr+" => (true, true, false, false, false, false),
            "w" => (false, true, false, true, true, false),
            "w+" => (true, true, false, true, true, false),
            "wx" | "xw" => (false, true, false, true, true, true),
            "wx+" | "xw+" => (true, true, false, true, true, true),
            "a" | "as" => (false, true, true, false, true, false),
            "a+" | "as+" => (true, true, true, false, true, false),
            "ax" | "xa" => (false, true, true, false, true, true),
            "ax+" | "xa+" => (true, true, true, false, true, true),
            _ => return None,
        };
        Some(Self {
            read,
            write,
            append,
            truncate,
            create,
            create_new,
        })
    }

    /// Decode numeric POSIX-style flag bits: access mode plus O_CREAT,
    /// O_EXCL, O_TRUNC, and O_APPEND.
    pub fn from_bits(bits: i64) -> Self {
        const O_WRONLY: i64 = 0o1;
        const O_RDWR: i64 = 0o2;
        const O_CREAT: i64 = 0o100;
        const O_EXCL: i64 = 0o200;
        const O_TRUNC: i64 = 0o1000;
        const O_APPEND: i64 = 0o2000;
        let wronly = bits & O_WRONLY != 0;
        let rdwr = bits & O_RDWR != 0;
        Self {
            read: !wronly,
            write: wronly || rdwr,
            append: bits & O_APPEND != 0,
            truncate: bits & O_TRUNC != 0,
            create: bits & O_CREAT != 0,
            create_new: bits & O_CREAT != 0 && bits & O_EXCL != 0,
        }
    }

    pub(crate) fn apply(&self, options: &mut std::fs::OpenOptions) {
        options
            .read(self.read)
            .write(self.write)
            .append(self.append)
            .truncate(self.truncate)
            .create(self.create)
            .create_new(self.create_new);
    }
}

impl Default for OpenFlags {
    fn default() -> Self {
        // "r"
        Self {
            read: true,
            write: false,
            append: false,
            truncate: false,
            create: false,
            create_new: false,
        }
    }
}

/// Options for recursive copy.
#[derive(Debug, Clone, Copy)]
pub struct CopyOptions {
    pub recursive: bool,
    pub force: bool,
    pub error_on_exist: bool,
    pub dereference: bool,
    pub preserve_timestamps: bool,
    /// COPYFILE_EXCL-style bit: fail when the destination exists.
    pub exclusive: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            force: true,
            error_on_exist: false,
            dereference: false,
            preserve_timestamps: false,
            exclusive: false,
        }
    }
}

/// Options for removal, including transient-failure retries.
#[derive(Debug, Clone, Copy)]
pub struct RmOptions {
    pub recursive: bool,
    pub force: bool,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for RmOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            force: false,
            max_retries: 0,
            retry_delay_ms: 100,
        }
    }
}
