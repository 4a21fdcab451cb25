//! Fixed word lists for C: keywords, type words, directive names, and the
//! standard-library names that must never be renamed.

/// C keywords (C89 through C23) plus the common GNU/MSVC spellings.
pub const C_KEYWORDS: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
    "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch", "typedef",
    "union", "unsigned", "void", "volatile", "while", "_Alignas", "_Alignof", "_Atomic", "_Bool",
    "_Complex", "_Generic", "_Imaginary", "_Noreturn", "_Static_assert", "_Thread_local",
    "alignas", "alignof", "bool", "constexpr", "false", "nullptr", "static_assert",
    "thread_local", "true", "typeof", "typeof_unqual", "_BitInt", "_Decimal32", "_Decimal64",
    "_Decimal128", "asm", "_Pragma",
];

/// Words that open a preprocessor directive or appear only inside one.
pub const DIRECTIVE_WORDS: &[&str] = &[
    "define", "defined", "elif", "elifdef", "elifndef", "else", "endif", "error", "ident",
    "if", "ifdef", "ifndef", "import", "include", "include_next", "line", "pragma", "undef",
    "warning", "embed", "__has_include", "__has_c_attribute",
];

/// Keywords that start or qualify a declaration-specifier sequence.
pub const TYPE_KEYWORDS: &[&str] = &[
    "char", "short", "int", "long", "float", "double", "void", "signed", "unsigned", "_Bool",
    "bool", "_Complex", "const", "volatile", "restrict", "static", "extern", "register", "auto",
    "inline", "_Atomic", "_Noreturn", "_Thread_local", "thread_local", "__inline", "__inline__",
    "__restrict", "__restrict__", "__const", "__volatile__", "__extension__",
];

/// Qualifiers that may sit between `*` and a declarator name.
pub const POINTER_QUALIFIERS: &[&str] =
    &["const", "volatile", "restrict", "__restrict", "__restrict__", "_Atomic"];

/// Library type names commonly used in declarations; treated as type words
/// when recognizing declarators, never as rename candidates.
pub const LIBRARY_TYPES: &[&str] = &[
    "size_t", "ssize_t", "ptrdiff_t", "intptr_t", "uintptr_t", "wchar_t", "FILE", "va_list",
    "int8_t", "int16_t", "int32_t", "int64_t", "uint8_t", "uint16_t", "uint32_t", "uint64_t",
    "intmax_t", "uintmax_t", "off_t", "time_t", "clock_t", "pid_t", "jmp_buf", "fpos_t",
    "sig_atomic_t", "mbstate_t", "char16_t", "char32_t", "max_align_t", "errno_t", "BOOL",
    "DWORD", "HANDLE", "WORD", "BYTE", "LPSTR", "LPCSTR",
];

/// Standard-library and runtime entry-point names that are never renamed.
pub const LIBRARY_NAMES: &[&str] = &[
    // program entry points
    "main", "wmain", "WinMain", "DllMain",
    // stdio
    "printf", "fprintf", "sprintf", "snprintf", "vprintf", "vfprintf", "vsprintf", "vsnprintf",
    "scanf", "fscanf", "sscanf", "vscanf", "vsscanf", "puts", "fputs", "gets", "fgets", "putchar",
    "getchar", "putc", "getc", "fputc", "fgetc", "ungetc", "fopen", "freopen", "fclose", "fflush",
    "fread", "fwrite", "fseek", "ftell", "rewind", "feof", "ferror", "clearerr", "perror",
    "remove", "rename", "tmpfile", "tmpnam", "setbuf", "setvbuf", "fileno", "stdin", "stdout",
    "stderr", "EOF",
    // stdlib
    "malloc", "calloc", "realloc", "free", "exit", "_Exit", "abort", "atexit", "at_quick_exit",
    "quick_exit", "atoi", "atol", "atoll", "atof", "strtol", "strtoul", "strtoll", "strtoull",
    "strtod", "strtof", "strtold", "rand", "srand", "qsort", "bsearch", "abs", "labs", "llabs",
    "div", "ldiv", "lldiv", "getenv", "system", "aligned_alloc",
    // string
    "memcpy", "memmove", "memset", "memcmp", "memchr", "strcpy", "strncpy", "strcat", "strncat",
    "strlen", "strcmp", "strncmp", "strchr", "strrchr", "strstr", "strtok", "strdup", "strndup",
    "strerror", "strspn", "strcspn", "strpbrk", "strcoll", "strxfrm",
    // ctype
    "isalpha", "isdigit", "isalnum", "isspace", "isupper", "islower", "ispunct", "isprint",
    "iscntrl", "isxdigit", "isgraph", "toupper", "tolower",
    // math
    "sqrt", "pow", "sin", "cos", "tan", "asin", "acos", "atan", "atan2", "exp", "log", "log10",
    "log2", "floor", "ceil", "fabs", "fmod", "round", "trunc", "hypot", "fmin", "fmax",
    // time, errno, assert, setjmp, signal, varargs
    "time", "clock", "difftime", "mktime", "localtime", "gmtime", "strftime", "asctime",
    "ctime", "errno", "assert", "setjmp", "longjmp", "signal", "raise", "va_start", "va_arg",
    "va_end", "va_copy", "offsetof", "NULL",
    // common POSIX
    "read", "write", "open", "close", "sleep", "usleep", "fork", "getpid", "pipe", "dup", "dup2",
    "pthread_create", "pthread_join", "pthread_mutex_lock", "pthread_mutex_unlock",
];

/// Control keywords whose parenthesized operand is followed by a statement.
pub const CONTROL_KEYWORDS: &[&str] = &["if", "while", "for", "switch"];

/// Callees whose parenthesized arguments are compile-time only contexts.
pub const RESTRICTED_PAREN_OWNERS: &[&str] = &[
    "asm", "__asm", "__asm__", "__attribute", "__attribute__", "__declspec", "_Static_assert",
    "static_assert", "sizeof", "_Alignof", "alignof", "_Alignas", "alignas", "typeof",
    "__typeof", "__typeof__", "typeof_unqual", "_Pragma", "_Generic", "offsetof",
];

/// Spellings of the GNU `asm` keyword.
pub const ASM_KEYWORDS: &[&str] = &["asm", "__asm", "__asm__"];

/// Qualifiers allowed between `asm` and its operand list.
pub const ASM_QUALIFIERS: &[&str] =
    &["volatile", "__volatile", "__volatile__", "inline", "__inline", "__inline__", "goto"];

pub fn is_keyword(word: &str) -> bool {
    C_KEYWORDS.contains(&word) || is_gnu_keyword(word)
}

/// GNU spellings such as `__attribute__`, `__asm__`, `__builtin_expect`.
pub fn is_gnu_keyword(word: &str) -> bool {
    word.starts_with("__builtin_")
        || matches!(
            word,
            "__attribute__"
                | "__attribute"
                | "__asm__"
                | "__asm"
                | "__typeof__"
                | "__typeof"
                | "__inline"
                | "__inline__"
                | "__restrict"
                | "__restrict__"
                | "__extension__"
                | "__volatile__"
                | "__const"
                | "__declspec"
                | "__int128"
        )
}

pub fn is_type_keyword(word: &str) -> bool {
    TYPE_KEYWORDS.contains(&word)
}

pub fn is_library_type(word: &str) -> bool {
    LIBRARY_TYPES.contains(&word)
}

pub fn is_library_name(word: &str) -> bool {
    LIBRARY_NAMES.contains(&word)
}

pub fn is_directive_word(word: &str) -> bool {
    DIRECTIVE_WORDS.contains(&word)
}

/// Macro/constant naming convention: has letters and none of them lowercase.
pub fn is_all_caps(word: &str) -> bool {
    word.chars().any(|c| c.is_ascii_alphabetic()) && !word.chars().any(|c| c.is_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_caps_requires_a_letter() {
        assert!(is_all_caps("MAX_LEN"));
        assert!(is_all_caps("X2"));
        assert!(!is_all_caps("_1"));
        assert!(!is_all_caps("MaxLen"));
    }

    #[test]
    fn builtins_count_as_keywords() {
        assert!(is_keyword("__builtin_expect"));
        assert!(is_keyword("while"));
        assert!(!is_keyword("count"));
    }
}
