use std::collections::{BTreeMap, HashMap};

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::graph_builder::CallGraph;
use crate::types::{ExternalCategory, ExternalFunctionInfo};
use crate::types::ExternalCategory::{CppStandardLibrary, Posix, StandardLibrary, SystemCall};

struct CatalogEntry {
    category: ExternalCategory,
    description: &'static str,
    is_safe: bool,
    parameter_count: i32,
    return_type: &'static str,
}

// name, category, description, safe, arity (-1 = variadic), return type
#[rustfmt::skip]
const KNOWN_FUNCTIONS: &[(&str, ExternalCategory, &str, bool, i32, &str)] = &[
    // stdio
    ("printf",   StandardLibrary, "Formatted output to stdout", true, -1, "int"),
    ("fprintf",  StandardLibrary, "Formatted output to a stream", true, -1, "int"),
    ("snprintf", StandardLibrary, "Bounded formatted output to a buffer", true, -1, "int"),
    ("sprintf",  StandardLibrary, "Unbounded formatted output to a buffer", false, -1, "int"),
    ("vsprintf", StandardLibrary, "Unbounded formatted output from a va_list", false, 3, "int"),
    ("scanf",    StandardLibrary, "Formatted input from stdin", false, -1, "int"),
    ("sscanf",   StandardLibrary, "Formatted input from a string", false, -1, "int"),
    ("fscanf",   StandardLibrary, "Formatted input from a stream", false, -1, "int"),
    ("gets",     StandardLibrary, "Read a line without bounds checking", false, 1, "char *"),
    ("fgets",    StandardLibrary, "Bounded line read from a stream", true, 3, "char *"),
    ("puts",     StandardLibrary, "Write a line to stdout", true, 1, "int"),
    ("putchar",  StandardLibrary, "Write a character to stdout", true, 1, "int"),
    ("getchar",  StandardLibrary, "Read a character from stdin", true, 0, "int"),
    ("fopen",    StandardLibrary, "Open a stream", true, 2, "FILE *"),
    ("fclose",   StandardLibrary, "Close a stream", true, 1, "int"),
    ("fread",    StandardLibrary, "Binary read from a stream", true, 4, "size_t"),
    ("fwrite",   StandardLibrary, "Binary write to a stream", true, 4, "size_t"),
    ("fflush",   StandardLibrary, "Flush a stream", true, 1, "int"),
    ("fseek",    StandardLibrary, "Reposition a stream", true, 3, "int"),
    ("ftell",    StandardLibrary, "Current stream position", true, 1, "long"),
    // memory
    ("malloc",   StandardLibrary, "Allocate uninitialized memory", true, 1, "void *"),
    ("calloc",   StandardLibrary, "Allocate zeroed memory", true, 2, "void *"),
    ("realloc",  StandardLibrary, "Resize an allocation", true, 2, "void *"),
    ("free",     StandardLibrary, "Release an allocation", true, 1, "void"),
    ("memcpy",   StandardLibrary, "Copy non-overlapping memory", false, 3, "void *"),
    ("memmove",  StandardLibrary, "Copy possibly overlapping memory", false, 3, "void *"),
    ("memset",   StandardLibrary, "Fill memory with a byte", true, 3, "void *"),
    ("memcmp",   StandardLibrary, "Compare memory regions", true, 3, "int"),
    // strings
    ("strlen",   StandardLibrary, "Length of a C string", true, 1, "size_t"),
    ("strcpy",   StandardLibrary, "Unbounded string copy", false, 2, "char *"),
    ("strncpy",  StandardLibrary, "Bounded copy, may leave no terminator", false, 3, "char *"),
    ("strcat",   StandardLibrary, "Unbounded string concatenation", false, 2, "char *"),
    ("strncat",  StandardLibrary, "Bounded string concatenation", false, 3, "char *"),
    ("strcmp",   StandardLibrary, "Compare strings", true, 2, "int"),
    ("strncmp",  StandardLibrary, "Compare string prefixes", true, 3, "int"),
    ("strchr",   StandardLibrary, "Find a character in a string", true, 2, "char *"),
    ("strstr",   StandardLibrary, "Find a substring", true, 2, "char *"),
    ("strtok",   StandardLibrary, "Tokenize a string with hidden state", false, 2, "char *"),
    ("strdup",   StandardLibrary, "Duplicate a string on the heap", true, 1, "char *"),
    // conversion, process, misc
    ("atoi",     StandardLibrary, "Parse an int without error reporting", true, 1, "int"),
    ("atol",     StandardLibrary, "Parse a long without error reporting", true, 1, "long"),
    ("strtol",   StandardLibrary, "Parse a long with error reporting", true, 3, "long"),
    ("strtoul",  StandardLibrary, "Parse an unsigned long", true, 3, "unsigned long"),
    ("rand",     StandardLibrary, "Pseudo-random number", true, 0, "int"),
    ("srand",    StandardLibrary, "Seed the pseudo-random generator", true, 1, "void"),
    ("time",     StandardLibrary, "Current calendar time", true, 1, "time_t"),
    ("getenv",   StandardLibrary, "Read an environment variable", true, 1, "char *"),
    ("exit",     StandardLibrary, "Terminate the process", true, 1, "void"),
    ("abort",    StandardLibrary, "Abnormal process termination", true, 0, "void"),
    ("qsort",    StandardLibrary, "Sort an array", true, 4, "void"),
    // C++ standard library
    ("std::move",      CppStandardLibrary, "Cast to an rvalue reference", true, 1, "T&&"),
    ("std::swap",      CppStandardLibrary, "Exchange two values", true, 2, "void"),
    ("std::sort",      CppStandardLibrary, "Sort a range", true, -1, "void"),
    ("std::max",       CppStandardLibrary, "Larger of two values", true, -1, "const T&"),
    ("std::min",       CppStandardLibrary, "Smaller of two values", true, -1, "const T&"),
    ("std::make_shared", CppStandardLibrary, "Allocate a shared_ptr", true, -1, "std::shared_ptr"),
    ("std::make_unique", CppStandardLibrary, "Allocate a unique_ptr", true, -1, "std::unique_ptr"),
    ("std::to_string", CppStandardLibrary, "Format a number as a string", true, 1, "std::string"),
    ("std::getline",   CppStandardLibrary, "Read a line into a string", true, -1, "std::istream&"),
    // POSIX
    ("open",     Posix, "Open a file descriptor", true, -1, "int"),
    ("close",    Posix, "Close a file descriptor", true, 1, "int"),
    ("read",     Posix, "Read from a file descriptor", true, 3, "ssize_t"),
    ("write",    Posix, "Write to a file descriptor", true, 3, "ssize_t"),
    ("lseek",    Posix, "Reposition a file descriptor", true, 3, "off_t"),
    ("mmap",     Posix, "Map memory", true, 6, "void *"),
    ("munmap",   Posix, "Unmap memory", true, 2, "int"),
    ("pipe",     Posix, "Create a pipe", true, 1, "int"),
    ("dup2",     Posix, "Duplicate a file descriptor", true, 2, "int"),
    ("socket",   Posix, "Create a socket", true, 3, "int"),
    ("bind",     Posix, "Bind a socket to an address", true, 3, "int"),
    ("listen",   Posix, "Listen for connections", true, 2, "int"),
    ("accept",   Posix, "Accept a connection", true, 3, "int"),
    ("connect",  Posix, "Connect a socket", true, 3, "int"),
    ("send",     Posix, "Send on a socket", true, 4, "ssize_t"),
    ("recv",     Posix, "Receive from a socket", true, 4, "ssize_t"),
    ("pthread_create", Posix, "Start a thread", true, 4, "int"),
    ("pthread_join",   Posix, "Wait for a thread", true, 2, "int"),
    ("pthread_mutex_lock",   Posix, "Lock a mutex", true, 1, "int"),
    ("pthread_mutex_unlock", Posix, "Unlock a mutex", true, 1, "int"),
    ("sleep",    Posix, "Suspend for seconds", true, 1, "unsigned int"),
    ("usleep",   Posix, "Suspend for microseconds", true, 1, "int"),
    ("getpid",   Posix, "Current process id", true, 0, "pid_t"),
    ("signal",   Posix, "Install a signal handler", true, 2, "sighandler_t"),
    // process control
    ("fork",     SystemCall, "Duplicate the process", false, 0, "pid_t"),
    ("vfork",    SystemCall, "Duplicate the process sharing memory", false, 0, "pid_t"),
    ("execve",   SystemCall, "Replace the process image", false, 3, "int"),
    ("execl",    SystemCall, "Replace the process image (list)", false, -1, "int"),
    ("execlp",   SystemCall, "Replace the process image (list, PATH)", false, -1, "int"),
    ("execv",    SystemCall, "Replace the process image (vector)", false, 2, "int"),
    ("execvp",   SystemCall, "Replace the process image (vector, PATH)", false, 2, "int"),
    ("system",   SystemCall, "Run a shell command", false, 1, "int"),
    ("popen",    SystemCall, "Run a shell command with a pipe", false, 2, "FILE *"),
    ("kill",     SystemCall, "Send a signal to a process", false, 2, "int"),
    ("waitpid",  SystemCall, "Wait for a child process", true, 3, "pid_t"),
];

static CATALOG: Lazy<HashMap<&'static str, CatalogEntry>> = Lazy::new(|| {
    KNOWN_FUNCTIONS
        .iter()
        .map(|&(name, category, description, is_safe, parameter_count, return_type)| {
            (
                name,
                CatalogEntry {
                    category,
                    description,
                    is_safe,
                    parameter_count,
                    return_type,
                },
            )
        })
        .collect()
});

static POSIX_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^(pthread_|sem_|shm_|mq_|sched_|sock|proc|thread|getp|setp)",
        r"|(read|write|open|close|ioctl|poll)$",
    ))
    .expect("posix name pattern")
});

static SYSTEM_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(exec|fork|spawn|system)").expect("system name pattern"));

/// Describe a function that is not defined in the analyzed program.
///
/// Depends only on `name`: catalog entries first, then the name heuristics.
/// Anything the catalog does not know is reported as unsafe.
pub fn lookup_external_function(name: &str) -> ExternalFunctionInfo {
    if let Some(entry) = CATALOG.get(name) {
        return ExternalFunctionInfo {
            name: name.to_string(),
            category: entry.category,
            description: entry.description.to_string(),
            is_safe: entry.is_safe,
            parameter_count: entry.parameter_count,
            return_type: entry.return_type.to_string(),
        };
    }

    let (category, description) = classify_by_name(name);
    ExternalFunctionInfo {
        name: name.to_string(),
        category,
        description: description.to_string(),
        is_safe: false,
        parameter_count: -1,
        return_type: String::from("unknown"),
    }
}

fn classify_by_name(name: &str) -> (ExternalCategory, &'static str) {
    if name.starts_with("std::") {
        (CppStandardLibrary, "C++ standard library function")
    } else if POSIX_NAME.is_match(name) {
        (Posix, "POSIX function")
    } else if SYSTEM_NAME.is_match(name) {
        (SystemCall, "Process-control system call")
    } else {
        (ExternalCategory::Unknown, "Unresolved external function")
    }
}

pub fn is_known_external(name: &str) -> bool {
    CATALOG.contains_key(name)
}

/// Every callee outside the function set, described. Leaves the graph alone.
pub fn classify_external_functions(graph: &CallGraph) -> BTreeMap<String, ExternalFunctionInfo> {
    let mut externals = BTreeMap::new();

    for call in graph.calls() {
        if graph.function(&call.callee).is_some() || externals.contains_key(&call.callee) {
            continue;
        }
        externals.insert(call.callee.clone(), lookup_external_function(&call.callee));
    }

    externals
}

/// Like [`classify_external_functions`], and also raises `is_external` on
/// the callee nodes.
pub fn identify_external_functions(
    graph: &mut CallGraph,
) -> BTreeMap<String, ExternalFunctionInfo> {
    let externals = classify_external_functions(graph);

    for name in externals.keys() {
        if let Some(idx) = graph.index_of(name) {
            graph.node_at_mut(idx).is_external = true;
        }
    }

    debug!("Identified {} external functions", externals.len());
    externals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CallEdge;
    use pretty_assertions::assert_eq;

    #[test]
    fn catalog_entries_carry_metadata() {
        let info = lookup_external_function("strcpy");
        assert_eq!(info.category, StandardLibrary);
        assert!(!info.is_safe);
        assert_eq!(info.parameter_count, 2);

        let printf = lookup_external_function("printf");
        assert!(printf.is_safe);
        assert_eq!(printf.parameter_count, -1);
    }

    #[test]
    fn heuristics_cover_unlisted_names() {
        assert_eq!(lookup_external_function("std::accumulate").category, CppStandardLibrary);
        assert_eq!(lookup_external_function("pthread_cond_wait").category, Posix);
        assert_eq!(lookup_external_function("pread").category, Posix);
        assert_eq!(lookup_external_function("posix_spawn").category, ExternalCategory::Unknown);
        assert_eq!(lookup_external_function("spawn_worker").category, SystemCall);
        assert_eq!(lookup_external_function("forkpty").category, SystemCall);
    }

    #[test]
    fn unknown_names_are_conservative() {
        let info = lookup_external_function("do_magic");
        assert_eq!(info.category, ExternalCategory::Unknown);
        assert!(!info.is_safe);
        assert_eq!(info.parameter_count, -1);
        assert_eq!(info.return_type, "unknown");
    }

    #[test]
    fn heuristic_matches_are_never_safe() {
        assert!(!lookup_external_function("std::accumulate").is_safe);
        assert!(!is_known_external("std::accumulate"));
    }

    #[test]
    fn identification_flags_callee_nodes() {
        let mut graph = CallGraph::new();
        graph.add_function("main", vec![]).unwrap();
        graph.add_function("helper", vec![]).unwrap();
        graph.add_call(CallEdge::new("main", "helper")).unwrap();
        graph.add_call(CallEdge::new("main", "printf")).unwrap();
        graph.add_call(CallEdge::new("helper", "printf")).unwrap();
        graph.add_call(CallEdge::new("helper", "gets")).unwrap();

        let externals = identify_external_functions(&mut graph);

        assert_eq!(
            externals.keys().cloned().collect::<Vec<_>>(),
            vec!["gets".to_string(), "printf".to_string()]
        );
        assert!(graph.node("printf").unwrap().is_external);
        assert!(!graph.function("helper").unwrap().is_external);
    }
}
