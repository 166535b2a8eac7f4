//! The static field tables and the descriptor catalog.
//!
//! Fields of `INFO`, `CLUSTER INFO` and `SERVER EXT` are mapped to metric
//! names by data, not by code. Different server versions, forks and modules
//! only add rows here.

use std::collections::HashMap;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    Gauge,
    Counter,
    Summary,
    Histogram,
}

/// The result of resolving a field of the status report.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mapping {
    pub name: &'static str,
    pub kind: Kind,
    /// Multiplier applied to the raw value, e.g. microseconds to seconds
    pub scale: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Descriptor {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: Kind,
    pub labels: &'static [&'static str],
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("field {0:?} is mapped as both gauge and counter")]
    Conflict(&'static str),

    #[error("metric {0:?} is declared more than once")]
    Duplicate(&'static str),

    #[error("metric {name:?} declares label {label:?} more than once")]
    DuplicateLabel {
        name: &'static str,
        label: &'static str,
    },
}

/// A field whose value needs a unit conversion, it is exported under
/// another name.
pub struct Transform {
    field: &'static str,
    name: &'static str,
    help: &'static str,
    scale: f64,
}

const TRANSFORMS: &[Transform] = &[Transform {
    field: "latest_fork_usec",
    name: "latest_fork_seconds",
    help: "Duration of the latest fork operation in seconds",
    scale: 1e-6,
}];

const SYSTEM_METRICS: &[(&str, &str, &str)] = &[(
    "total_system_memory",
    "total_system_memory_bytes",
    "The total amount of memory that the Redis host has",
)];

/// `(field, metric name, help)` of gauge valued fields
const GAUGE_METRICS: &[(&str, &str, &str)] = &[
    (
        "uptime_in_seconds",
        "uptime_in_seconds",
        "Number of seconds since Redis server start",
    ),
    (
        "io_threads_active",
        "io_threads_active",
        "Flag indicating if I/O threads are active",
    ),
    (
        "connected_clients",
        "connected_clients",
        "Number of client connections (excluding connections from replicas)",
    ),
    (
        "blocked_clients",
        "blocked_clients",
        "Number of clients pending on a blocking call",
    ),
    (
        "maxclients",
        "max_clients",
        "The value of the maxclients configuration directive. This is the upper limit for the sum of connected_clients, connected_slaves and cluster_connections.",
    ),
    (
        "tracking_clients",
        "tracking_clients",
        "Number of clients being tracked",
    ),
    (
        "clients_in_timeout_table",
        "clients_in_timeout_table",
        "Number of clients in the clients timeout table",
    ),
    (
        "pubsub_clients",
        "pubsub_clients",
        "Number of clients in pubsub mode",
    ),
    (
        "watching_clients",
        "watching_clients",
        "Number of clients in watching mode",
    ),
    (
        "total_watched_keys",
        "total_watched_keys",
        "Number of watched keys",
    ),
    (
        "total_blocking_keys",
        "total_blocking_keys",
        "Number of blocking keys",
    ),
    (
        "total_blocking_keys_on_nokey",
        "total_blocking_keys_on_nokey",
        "Number of blocking keys that one or more clients that would like to be unblocked when the key is deleted",
    ),
    (
        "client_longest_output_list",
        "client_longest_output_list",
        "Longest output list among current client connections",
    ),
    (
        "client_biggest_input_buf",
        "client_biggest_input_buf",
        "Biggest input buffer among current client connections",
    ),
    (
        "client_recent_max_output_buffer",
        "client_recent_max_output_buffer_bytes",
        "Biggest output buffer among current client connections",
    ),
    (
        "client_recent_max_input_buffer",
        "client_recent_max_input_buffer_bytes",
        "Biggest input buffer among current client connections",
    ),
    (
        "allocator_active",
        "allocator_active_bytes",
        "Total bytes in the allocator active pages, this includes external-fragmentation",
    ),
    (
        "allocator_allocated",
        "allocator_allocated_bytes",
        "Total bytes allocated form the allocator, including internal-fragmentation. Normally the same as used_memory",
    ),
    (
        "allocator_resident",
        "allocator_resident_bytes",
        "Total bytes resident (RSS) in the allocator, this includes pages that can be released to the OS (by MEMORY PURGE, or just waiting)",
    ),
    (
        "allocator_frag_ratio",
        "allocator_frag_ratio",
        "Ratio between allocator_active and allocator_allocated. This is the true (external) fragmentation metric (not mem_fragmentation_ratio)",
    ),
    (
        "allocator_frag_bytes",
        "allocator_frag_bytes",
        "Delta between allocator_active and allocator_allocated",
    ),
    (
        "allocator_muzzy",
        "allocator_muzzy_bytes",
        "Total bytes of 'muzzy' memory (RSS) in the allocator. Muzzy memory is memory that has been freed, but not yet fully returned to the operating system. It can be reused immediately when needed or reclaimed by the OS when system pressure increases.",
    ),
    (
        "allocator_rss_ratio",
        "allocator_rss_ratio",
        "Ratio between allocator_resident and allocator_active. This usually indicates pages that the allocator can and probably will soon release back to the OS",
    ),
    (
        "allocator_rss_bytes",
        "allocator_rss_bytes",
        "Delta between allocator_resident and allocator_active",
    ),
    (
        "used_memory",
        "memory_used_bytes",
        "Total number of bytes allocated by Redis using its allocator",
    ),
    (
        "used_memory_rss",
        "memory_used_rss_bytes",
        "Number of bytes that Redis allocated as seen by the operating system (a.k.a resident set size)",
    ),
    (
        "used_memory_peak",
        "memory_used_peak_bytes",
        "Peak memory consumed by Redis in bytes",
    ),
    (
        "used_memory_lua",
        "memory_used_lua_bytes",
        "Number of bytes used by the Lua engine for EVAL scripts",
    ),
    (
        "used_memory_vm_eval",
        "memory_used_vm_eval_bytes",
        "Number of bytes used by the script VM engines for EVAL framework (not part of used_memory)",
    ),
    (
        "used_memory_scripts_eval",
        "memory_used_scripts_eval_bytes",
        "Number of bytes overhead by the EVAL scripts (part of used_memory)",
    ),
    (
        "used_memory_overhead",
        "memory_used_overhead_bytes",
        "The sum in bytes of all overheads that the server allocated for managing its internal data structures",
    ),
    (
        "used_memory_startup",
        "memory_used_startup_bytes",
        "Initial amount of memory consumed by Redis at startup in bytes",
    ),
    (
        "used_memory_dataset",
        "memory_used_dataset_bytes",
        "The size in bytes of the dataset (used_memory_overhead subtracted from used_memory)",
    ),
    (
        "number_of_cached_scripts",
        "number_of_cached_scripts",
        "The number of EVAL scripts cached by the server",
    ),
    (
        "number_of_functions",
        "number_of_functions",
        "The number of functions",
    ),
    (
        "number_of_libraries",
        "number_of_libraries",
        "The number of libraries",
    ),
    (
        "used_memory_vm_functions",
        "memory_used_vm_functions_bytes",
        "Number of bytes used by the script VM engines for Functions framework (not part of used_memory)",
    ),
    (
        "used_memory_scripts",
        "memory_used_scripts_bytes",
        "used_memory_scripts_eval + used_memory_functions (part of used_memory)",
    ),
    (
        "used_memory_functions",
        "memory_used_functions_bytes",
        "Number of bytes overhead by Function scripts (part of used_memory)",
    ),
    (
        "used_memory_vm_total",
        "memory_used_vm_total",
        "used_memory_vm_eval + used_memory_vm_functions (not part of used_memory)",
    ),
    (
        "maxmemory",
        "memory_max_bytes",
        " The value of the maxmemory configuration directive",
    ),
    (
        "maxmemory_reservation",
        "memory_max_reservation_bytes",
        "Reserved maximum memory in bytes",
    ),
    (
        "maxmemory_desired_reservation",
        "memory_max_reservation_desired_bytes",
        "Desired reserved maximum memory in bytes",
    ),
    (
        "maxfragmentationmemory_reservation",
        "memory_max_fragmentation_reservation_bytes",
        "Reserved maximum fragmentation memory in bytes",
    ),
    (
        "maxfragmentationmemory_desired_reservation",
        "memory_max_fragmentation_reservation_desired_bytes",
        "Desired reserved maximum fragmentation memory in bytes",
    ),
    (
        "mem_fragmentation_ratio",
        "mem_fragmentation_ratio",
        "Ratio between used_memory_rss and used_memory. Note that this doesn't only includes fragmentation, but also other process overheads (see the allocator_* metrics), and also overheads like code, shared libraries, stack, etc",
    ),
    (
        "mem_fragmentation_bytes",
        "mem_fragmentation_bytes",
        "Delta between used_memory_rss and used_memory. Note that when the total fragmentation bytes is low (few megabytes), a high ratio (e.g. 1.5 and above) is not an indication of an issue",
    ),
    (
        "mem_clients_slaves",
        "mem_clients_slaves",
        "Memory used by replica clients - Starting Redis 7.0, replica buffers share memory with the replication backlog, so this field can show 0 when replicas don't trigger an increase of memory usage",
    ),
    (
        "mem_clients_normal",
        "mem_clients_normal",
        "Memory used by normal clients",
    ),
    (
        "mem_cluster_links",
        "mem_cluster_links_bytes",
        "Memory used by links to peers on the cluster bus when cluster mode is enabled",
    ),
    (
        "mem_aof_buffer",
        "mem_aof_buffer_bytes",
        "Transient memory used for AOF and AOF rewrite buffers",
    ),
    (
        "mem_replication_backlog",
        "mem_replication_backlog_bytes",
        "Memory used by replication backlog",
    ),
    (
        "expired_stale_perc",
        "expired_stale_percentage",
        "The percentage of keys probably expired",
    ),
    (
        "mem_not_counted_for_evict",
        "mem_not_counted_for_eviction_bytes",
        "Used memory that's not counted for key eviction. This is basically transient replica and AOF buffers",
    ),
    (
        "mem_total_replication_buffers",
        "mem_total_replication_buffers_bytes",
        "Total memory consumed for replication buffers",
    ),
    (
        "mem_overhead_db_hashtable_rehashing",
        "mem_overhead_db_hashtable_rehashing_bytes",
        "Temporary memory overhead of database dictionaries currently being rehashed",
    ),
    (
        "lazyfree_pending_objects",
        "lazyfree_pending_objects",
        "The number of objects waiting to be freed",
    ),
    (
        "lazyfreed_objects",
        "lazyfreed_objects",
        "The number of objects that have been lazy freed",
    ),
    (
        "active_defrag_running",
        "active_defrag_running",
        "When activedefrag is enabled, this indicates whether defragmentation is currently active, and the CPU percentage it intends to utilize",
    ),
    (
        "migrate_cached_sockets",
        "migrate_cached_sockets_total",
        "The number of sockets open for MIGRATE purposes",
    ),
    (
        "active_defrag_hits",
        "defrag_hits",
        "Number of value reallocations performed by active the defragmentation process",
    ),
    (
        "active_defrag_misses",
        "defrag_misses",
        "Number of aborted value reallocations started by the active defragmentation process",
    ),
    (
        "active_defrag_key_hits",
        "defrag_key_hits",
        "Number of keys that were actively defragmented",
    ),
    (
        "active_defrag_key_misses",
        "defrag_key_misses",
        "Number of keys that were skipped by the active defragmentation process",
    ),
    (
        "loading",
        "loading_dump_file",
        "Flag indicating if the load of a dump file is on-going",
    ),
    (
        "async_loading",
        "async_loading",
        "Currently loading replication data-set asynchronously while serving old data. This means repl-diskless-load is enabled and set to swapdb",
    ),
    (
        "rdb_changes_since_last_save",
        "rdb_changes_since_last_save",
        "Number of changes since the last dump",
    ),
    (
        "rdb_bgsave_in_progress",
        "rdb_bgsave_in_progress",
        "Flag indicating a RDB save is on-going",
    ),
    (
        "rdb_last_save_time",
        "rdb_last_save_timestamp_seconds",
        "Epoch-based timestamp of last successful RDB save",
    ),
    (
        "rdb_last_bgsave_status",
        "rdb_last_bgsave_status",
        "Status of the last RDB save operation",
    ),
    (
        "rdb_last_bgsave_time_sec",
        "rdb_last_bgsave_duration_sec",
        "Duration of the last RDB save operation in seconds",
    ),
    (
        "rdb_current_bgsave_time_sec",
        "rdb_current_bgsave_duration_sec",
        "Duration of the on-going RDB save operation if any",
    ),
    (
        "rdb_saves",
        "rdb_saves_total",
        "Number of RDB snapshots performed since startup",
    ),
    (
        "rdb_last_cow_size",
        "rdb_last_cow_size_bytes",
        "The size in bytes of copy-on-write memory during the last RDB save operation",
    ),
    (
        "rdb_last_load_keys_expired",
        "rdb_last_load_expired_keys",
        "Number of volatile keys deleted during the last RDB loading",
    ),
    (
        "rdb_last_load_keys_loaded",
        "rdb_last_load_loaded_keys",
        "Number of keys loaded during the last RDB loading",
    ),
    (
        "aof_enabled",
        "aof_enabled",
        "Flag indicating AOF logging is activated",
    ),
    (
        "aof_rewrite_in_progress",
        "aof_rewrite_in_progress",
        "Flag indicating a AOF rewrite operation is on-going",
    ),
    (
        "aof_rewrite_scheduled",
        "aof_rewrite_scheduled",
        "Flag indicating an AOF rewrite operation will be scheduled once the on-going RDB save is complete",
    ),
    (
        "aof_last_rewrite_time_sec",
        "aof_last_rewrite_duration_sec",
        "Duration of the last AOF rewrite operation in seconds",
    ),
    (
        "aof_current_rewrite_time_sec",
        "aof_current_rewrite_duration_sec",
        "Duration of the on-going AOF rewrite operation if any",
    ),
    (
        "aof_last_cow_size",
        "aof_last_cow_size_bytes",
        "The size in bytes of copy-on-write memory during the last AOF rewrite operation",
    ),
    (
        "aof_current_size",
        "aof_current_size_bytes",
        "AOF current file size",
    ),
    (
        "aof_base_size",
        "aof_base_size_bytes",
        "AOF file size on latest startup or rewrite",
    ),
    (
        "aof_pending_rewrite",
        "aof_pending_rewrite",
        "Flag indicating an AOF rewrite operation will be scheduled once the on-going RDB save is complete",
    ),
    (
        "aof_buffer_length",
        "aof_buffer_length",
        "Size of the AOF buffer",
    ),
    (
        "aof_rewrite_buffer_length",
        "aof_rewrite_buffer_length",
        "Size of the AOF rewrite buffer",
    ),
    (
        "aof_pending_bio_fsync",
        "aof_pending_bio_fsync",
        "Number of fsync pending jobs in background I/O queue",
    ),
    (
        "aof_delayed_fsync",
        "aof_delayed_fsync",
        "Delayed fsync counter",
    ),
    (
        "aof_last_bgrewrite_status",
        "aof_last_bgrewrite_status",
        "Status of the last AOF rewrite operation",
    ),
    (
        "aof_last_write_status",
        "aof_last_write_status",
        "Status of the last write operation to the AOF",
    ),
    (
        "module_fork_in_progress",
        "module_fork_in_progress",
        "Flag indicating a module fork is on-going",
    ),
    (
        "module_fork_last_cow_size",
        "module_fork_last_cow_size",
        "The size in bytes of copy-on-write memory during the last module fork operation",
    ),
    (
        "current_eviction_exceeded_time",
        "current_eviction_exceeded_time_ms",
        "The time passed since used_memory last rose above maxmemory, in milliseconds",
    ),
    (
        "pubsub_channels",
        "pubsub_channels",
        "Global number of pub/sub channels with client subscriptions",
    ),
    (
        "pubsub_patterns",
        "pubsub_patterns",
        "Global number of pub/sub pattern with client subscriptions",
    ),
    (
        "pubsubshard_channels",
        "pubsubshard_channels",
        "Global number of pub/sub shard channels with client subscriptions",
    ),
    (
        "tracking_total_keys",
        "tracking_total_keys",
        "Number of keys being tracked by the server",
    ),
    (
        "tracking_total_items",
        "tracking_total_items",
        "Number of items, that is the sum of clients number for each key, that are being tracked",
    ),
    (
        "tracking_total_prefixes",
        "tracking_total_prefixes",
        "Number of tracked prefixes in server's prefix table (only applicable for broadcast mode)",
    ),
    (
        "connected_slaves",
        "connected_slaves",
        "Number of connected replicas",
    ),
    (
        "repl_backlog_size",
        "replication_backlog_bytes",
        "Total size in bytes of the replication backlog buffer",
    ),
    (
        "repl_backlog_active",
        "repl_backlog_is_active",
        "Flag indicating replication backlog is active",
    ),
    (
        "repl_backlog_first_byte_offset",
        "repl_backlog_first_byte_offset",
        "The master offset of the replication backlog buffer",
    ),
    (
        "repl_backlog_histlen",
        "repl_backlog_history_bytes",
        "Size in bytes of the data in the replication backlog buffer",
    ),
    (
        "master_repl_offset",
        "master_repl_offset",
        "The server's current replication offset",
    ),
    (
        "second_repl_offset",
        "second_repl_offset",
        "The offset up to which replication IDs are accepted",
    ),
    (
        "slave_expires_tracked_keys",
        "slave_expires_tracked_keys",
        "The number of keys tracked for expiry purposes (applicable only to writable replicas)",
    ),
    (
        "slave_priority",
        "slave_priority",
        "The priority of the instance as a candidate for failover",
    ),
    (
        "sync_full",
        "replica_resyncs_full",
        "The number of full resyncs with replicas",
    ),
    (
        "sync_partial_ok",
        "replica_partial_resync_accepted",
        "The number of accepted partial resync requests",
    ),
    (
        "sync_partial_err",
        "replica_partial_resync_denied",
        "The number of denied partial resync requests",
    ),
    (
        "cluster_enabled",
        "cluster_enabled",
        "Indicate Redis cluster is enabled",
    ),
    (
        "cluster_state",
        "cluster_state",
        "State is 1 if the node is able to receive queries",
    ),
    (
        "cluster_slots_assigned",
        "cluster_slots_assigned",
        "Number of slots which are associated to some node",
    ),
    (
        "cluster_slots_ok",
        "cluster_slots_ok",
        "Number of slots mapping to a node not in FAIL or PFAIL state",
    ),
    (
        "cluster_slots_pfail",
        "cluster_slots_pfail",
        "Number of slots mapping to a node in PFAIL state",
    ),
    (
        "cluster_slots_fail",
        "cluster_slots_fail",
        "Number of slots mapping to a node in FAIL state",
    ),
    (
        "cluster_known_nodes",
        "cluster_known_nodes",
        "The total number of known nodes in the cluster",
    ),
    (
        "cluster_size",
        "cluster_size",
        "The number of master nodes serving at least one hash slot in the cluster",
    ),
    (
        "cluster_current_epoch",
        "cluster_current_epoch",
        "The local Current Epoch variable",
    ),
    (
        "cluster_my_epoch",
        "cluster_my_epoch",
        "The Config Epoch of the node",
    ),
    (
        "cluster_connections",
        "cluster_connections",
        "The number of connections to other nodes on the cluster bus",
    ),
    ("hz", "hz", "The server's current frequency setting"),
    (
        "configured_hz",
        "configured_hz",
        "The server's configured frequency setting",
    ),
    (
        "cluster_stats_messages_sent",
        "cluster_messages_sent_total",
        "Number of messages sent via the cluster node-to-node binary bus",
    ),
    (
        "cluster_stats_messages_received",
        "cluster_messages_received_total",
        "Number of messages received via the cluster node-to-node binary bus",
    ),
    (
        "tile38_aof_size",
        "tile38_aof_size_bytes",
        "Size of the append only file in bytes",
    ),
    (
        "tile38_avg_point_size",
        "tile38_avg_item_size_bytes",
        "Average point size in bytes",
    ),
    (
        "tile38_sys_cpus",
        "tile38_cpus_total",
        "Number of logical CPUs usable by the server",
    ),
    (
        "tile38_heap_released_bytes",
        "tile38_heap_released_bytes",
        "Bytes of heap released to the OS",
    ),
    (
        "tile38_heap_alloc_bytes",
        "tile38_heap_size_bytes",
        "Bytes of allocated heap objects",
    ),
    (
        "tile38_http_transport",
        "tile38_http_transport",
        "Whether the HTTP transport is enabled",
    ),
    (
        "tile38_in_memory_size",
        "tile38_in_memory_size_bytes",
        "Estimated memory size of all collections in bytes",
    ),
    (
        "tile38_max_heap_size",
        "tile38_max_heap_size_bytes",
        "Maximum heap size allowed in bytes",
    ),
    (
        "tile38_alloc_bytes",
        "tile38_mem_alloc_bytes",
        "Bytes of allocated memory",
    ),
    (
        "tile38_num_collections",
        "tile38_num_collections_total",
        "Total number of collections",
    ),
    (
        "tile38_num_hooks",
        "tile38_num_hooks_total",
        "Total number of hooks",
    ),
    (
        "tile38_num_objects",
        "tile38_num_objects_total",
        "Total number of objects",
    ),
    (
        "tile38_num_points",
        "tile38_num_points_total",
        "Total number of points",
    ),
    (
        "tile38_pointer_size",
        "tile38_pointer_size_bytes",
        "Size of a pointer in bytes",
    ),
    (
        "tile38_read_only",
        "tile38_read_only",
        "Whether the server is in read only mode",
    ),
    (
        "tile38_go_threads",
        "tile38_threads_total",
        "Number of threads used by the runtime",
    ),
    (
        "tile38_go_goroutines",
        "tile38_go_goroutines_total",
        "Number of running goroutines",
    ),
    (
        "tile38_last_gc_time_seconds",
        "tile38_last_gc_time_seconds",
        "Time of the last garbage collection in seconds",
    ),
    (
        "tile38_next_gc_bytes",
        "tile38_next_gc_bytes",
        "Target heap size of the next garbage collection in bytes",
    ),
    (
        "server_threads",
        "server_threads_total",
        "Number of server threads",
    ),
    (
        "long_lock_waits",
        "long_lock_waits_total",
        "Number of long lock waits",
    ),
    (
        "current_client_thread",
        "current_client_thread",
        "Thread serving the current client",
    ),
    (
        "search_number_of_indexes",
        "search_number_of_indexes",
        "The total number of indexes in the shard",
    ),
    (
        "search_used_memory_indexes",
        "search_used_memory_indexes_bytes",
        "The total memory allocated by all indexes in the shard in bytes",
    ),
    (
        "search_global_idle",
        "search_global_idle",
        "The total number of user and internal cursors currently holding pending results in the shard",
    ),
    (
        "search_global_total",
        "search_global_total",
        "The total number of user and internal cursors in the shard, either holding pending results or actively executing FT.CURSOR READ",
    ),
    (
        "search_bytes_collected",
        "search_collected_bytes",
        "The total amount of memory freed by the garbage collectors from indexes in the shard memory in bytes",
    ),
    (
        "search_dialect_1",
        "search_dialect_1",
        "Number of queries using dialect 1",
    ),
    (
        "search_dialect_2",
        "search_dialect_2",
        "Number of queries using dialect 2",
    ),
    (
        "search_dialect_3",
        "search_dialect_3",
        "Number of queries using dialect 3",
    ),
    (
        "search_dialect_4",
        "search_dialect_4",
        "Number of queries using dialect 4",
    ),
    (
        "search_number_of_active_indexes",
        "search_number_of_active_indexes",
        "The total number of indexes running a background indexing and/or background query processing operation",
    ),
    (
        "search_number_of_active_indexes_running_queries",
        "search_number_of_active_indexes_running_queries",
        "The total count of indexes currently running a background query process",
    ),
    (
        "search_number_of_active_indexes_indexing",
        "search_number_of_active_indexes_indexing",
        "The total count of indexes currently undergoing a background indexing process",
    ),
    (
        "search_total_active_write_threads",
        "search_total_active_write_threads",
        "The total count of background write (indexing) processes currently running in the shard",
    ),
    (
        "search_smallest_memory_index",
        "search_smallest_memory_index_bytes",
        "The memory usage of the index with the smallest memory usage in the shard in bytes",
    ),
    (
        "search_largest_memory_index",
        "search_largest_memory_index_bytes",
        "The memory usage of the index with the largest memory usage in the shard in bytes",
    ),
    (
        "search_used_memory_vector_index",
        "search_used_memory_vector_index_bytes",
        "The total memory usage of all vector indexes in the shard",
    ),
    (
        "search_global_idle_user",
        "search_global_idle_user",
        "Number of idle user cursors in the shard",
    ),
    (
        "search_global_idle_internal",
        "search_global_idle_internal",
        "Number of idle internal cursors in the shard",
    ),
    (
        "search_global_total_user",
        "search_global_total_user",
        "Total number of user cursors in the shard",
    ),
    (
        "search_global_total_internal",
        "search_global_total_internal",
        "Total number of internal cursors in the shard",
    ),
    (
        "search_gc_bytes_collected",
        "search_gc_collected_bytes",
        "The total amount of memory freed by the garbage collectors from indexes in the shard's memory in bytes",
    ),
    (
        "search_gc_total_docs_not_collected",
        "search_gc_total_docs_not_collected",
        "The number of documents marked as deleted, whose memory has not yet been freed by the garbage collector",
    ),
    (
        "search_gc_marked_deleted_vectors",
        "search_gc_marked_deleted_vectors",
        "The number of vectors marked as deleted in the vector indexes that have not yet been cleaned",
    ),
    (
        "search_errors_indexing_failures",
        "search_errors_indexing_failures",
        "The total number of indexing failures recorded across all indexes in the shard",
    ),
];

/// `(field, metric name, help)` of counter valued fields
const COUNTER_METRICS: &[(&str, &str, &str)] = &[
    (
        "total_connections_received",
        "connections_received_total",
        "Total number of connections accepted by the server",
    ),
    (
        "total_commands_processed",
        "commands_processed_total",
        "Total number of commands processed by the server",
    ),
    (
        "rejected_connections",
        "rejected_connections_total",
        "Number of connections rejected because of maxclients limit",
    ),
    (
        "total_net_input_bytes",
        "net_input_bytes_total",
        "The total number of bytes read from the network",
    ),
    (
        "total_net_output_bytes",
        "net_output_bytes_total",
        "The total number of bytes written to the network",
    ),
    (
        "total_net_repl_input_bytes",
        "net_repl_input_bytes_total",
        "The total number of bytes read from the network for replication purposes",
    ),
    (
        "total_net_repl_output_bytes",
        "net_repl_output_bytes_total",
        "The total number of bytes written to the network for replication purposes",
    ),
    (
        "expired_subkeys",
        "expired_subkeys_total",
        "The number of hash field expiration events",
    ),
    (
        "expired_keys",
        "expired_keys_total",
        "Total number of key expiration events",
    ),
    (
        "expired_time_cap_reached_count",
        "expired_time_cap_reached_total",
        "The count of times that active expiry cycles have stopped early",
    ),
    (
        "expire_cycle_cpu_milliseconds",
        "expire_cycle_cpu_time_ms_total",
        "The cumulative amount of time spent on active expiry cycles",
    ),
    (
        "evicted_keys",
        "evicted_keys_total",
        "Number of evicted keys due to maxmemory limit",
    ),
    (
        "evicted_clients",
        "evicted_clients_total",
        "Number of evicted clients due to maxmemory-clients limit",
    ),
    (
        "evicted_scripts",
        "evicted_scripts_total",
        "Number of evicted EVAL scripts due to LRU policy, see EVAL for more details",
    ),
    (
        "total_eviction_exceeded_time",
        "eviction_exceeded_time_ms_total",
        "Total time used_memory was greater than maxmemory since server startup, in milliseconds",
    ),
    (
        "keyspace_hits",
        "keyspace_hits_total",
        "Number of successful lookup of keys in the main dictionary",
    ),
    (
        "keyspace_misses",
        "keyspace_misses_total",
        "Number of failed lookup of keys in the main dictionary",
    ),
    (
        "used_cpu_sys",
        "cpu_sys_seconds_total",
        "System CPU consumed by the Redis server, which is the sum of system CPU consumed by all threads of the server process (main thread and background threads)",
    ),
    (
        "used_cpu_user",
        "cpu_user_seconds_total",
        "User CPU consumed by the Redis server, which is the sum of user CPU consumed by all threads of the server process (main thread and background threads)",
    ),
    (
        "used_cpu_sys_children",
        "cpu_sys_children_seconds_total",
        "System CPU consumed by the background processes",
    ),
    (
        "used_cpu_user_children",
        "cpu_user_children_seconds_total",
        "User CPU consumed by the background processes",
    ),
    (
        "used_cpu_sys_main_thread",
        "cpu_sys_main_thread_seconds_total",
        "System CPU consumed by the Redis server main thread",
    ),
    (
        "used_cpu_user_main_thread",
        "cpu_user_main_thread_seconds_total",
        "User CPU consumed by the Redis server main thread",
    ),
    (
        "unexpected_error_replies",
        "unexpected_error_replies",
        "Number of unexpected error replies, that are types of errors from an AOF load or replication",
    ),
    (
        "total_error_replies",
        "total_error_replies",
        "Total number of issued error replies, that is the sum of rejected commands (errors prior command execution) and failed commands (errors within the command execution)",
    ),
    (
        "dump_payload_sanitizations",
        "dump_payload_sanitizations",
        "Total number of dump payload deep integrity validations (see sanitize-dump-payload config)",
    ),
    (
        "total_reads_processed",
        "total_reads_processed",
        "Total number of read events processed",
    ),
    (
        "total_writes_processed",
        "total_writes_processed",
        "Total number of write events processed",
    ),
    (
        "io_threaded_reads_processed",
        "io_threaded_reads_processed",
        "Number of read events processed by I/O threads",
    ),
    (
        "io_threaded_writes_processed",
        "io_threaded_writes_processed",
        "Number of write events processed by I/O threads",
    ),
    (
        "client_query_buffer_limit_disconnections",
        "client_query_buffer_limit_disconnections_total",
        "Total number of disconnections due to client reaching query buffer limit",
    ),
    (
        "client_output_buffer_limit_disconnections",
        "client_output_buffer_limit_disconnections_total",
        "Total number of disconnections due to client reaching output buffer limit",
    ),
    (
        "reply_buffer_shrinks",
        "reply_buffer_shrinks_total",
        "Total number of output buffer shrinks",
    ),
    (
        "reply_buffer_expands",
        "reply_buffer_expands_total",
        "Total number of output buffer expands",
    ),
    (
        "acl_access_denied_auth",
        "acl_access_denied_auth_total",
        "Number of authentication failures",
    ),
    (
        "acl_access_denied_cmd",
        "acl_access_denied_cmd_total",
        "Number of commands rejected because of access denied to the command",
    ),
    (
        "acl_access_denied_key",
        "acl_access_denied_key_total",
        "Number of commands rejected because of access denied to a key",
    ),
    (
        "acl_access_denied_channel",
        "acl_access_denied_channel_total",
        "Number of commands rejected because of access denied to a channel",
    ),
    (
        "cached_keys",
        "cached_keys_total",
        "Number of keys cached in memory",
    ),
    (
        "storage_provider_read_hits",
        "storage_provider_read_hits",
        "Number of storage provider read hits",
    ),
    (
        "storage_provider_read_misses",
        "storage_provider_read_misses",
        "Number of storage provider read misses",
    ),
    (
        "search_total_indexing_time",
        "search_indexing_time_ms_total",
        "The total time spent on indexing operations, excluding the background indexing of vectors in the HNSW graph",
    ),
    (
        "search_total_cycles",
        "search_cycles_total",
        "The total number of garbage collection cycles executed",
    ),
    (
        "search_total_ms_run",
        "search_run_ms_total",
        "The total duration of all garbage collection cycles in the shard, measured in milliseconds",
    ),
    (
        "search_gc_total_cycles",
        "search_gc_cycles_total",
        "The total number of garbage collection cycles executed",
    ),
    (
        "search_gc_total_ms_run",
        "search_gc_run_ms_total",
        "The total duration of all garbage collection cycles in the shard, measured in milliseconds",
    ),
    (
        "search_total_queries_processed",
        "search_queries_processed_total",
        "The total number of successful query executions (When using cursors, not counting reading from existing cursors) in the shard",
    ),
    (
        "search_total_query_commands",
        "search_query_commands_total",
        "The total number of successful query command executions",
    ),
    (
        "search_total_query_execution_time_ms",
        "search_query_execution_time_ms_total",
        "The cumulative execution time of all query commands, including FT.SEARCH, FT.AGGREGATE, and FT.CURSOR READ, measured in ms",
    ),
    (
        "search_total_active_queries",
        "search_active_queries_total",
        "The total number of background queries currently being executed in the shard, excluding FT.CURSOR READ",
    ),
];
macro_rules! descriptor {
    ($name:literal, $kind:ident, $help:literal) => {
        descriptor!($name, $kind, $help, [])
    };
    ($name:literal, $kind:ident, $help:literal, [$($label:literal),* $(,)?]) => {
        Descriptor {
            name: $name,
            help: $help,
            kind: Kind::$kind,
            labels: &[$($label),*],
        }
    };
}

/// Series families which are not produced by the field tables.
const DESCRIPTORS: &[Descriptor] = &[
    // scrape health
    descriptor!("up", Gauge, "Information about the Redis instance"),
    descriptor!(
        "exporter_last_scrape_error",
        Gauge,
        "The last scrape error status.",
        ["err"]
    ),
    descriptor!(
        "exporter_last_scrape_connect_time_seconds",
        Gauge,
        "Duration of the last connect to the Redis instance in seconds"
    ),
    descriptor!(
        "exporter_last_scrape_ping_time_seconds",
        Gauge,
        "Duration of the last PING in seconds"
    ),
    descriptor!(
        "exporter_last_scrape_duration_seconds",
        Gauge,
        "The last scrape duration."
    ),
    descriptor!(
        "exporter_scrapes_total",
        Counter,
        "Current total redis scrapes."
    ),
    descriptor!(
        "exporter_scrape_duration_seconds",
        Summary,
        "Durations of scrapes by the exporter"
    ),
    descriptor!(
        "exporter_scan_budget_exceeded_total",
        Counter,
        "Number of key scans stopped by the iteration cap"
    ),

    // info
    descriptor!(
        "instance_info",
        Gauge,
        "Information about the Redis instance",
        [
            "role",
            "redis_version",
            "redis_build_id",
            "redis_mode",
            "os",
            "maxmemory_policy",
            "tcp_port",
            "run_id",
            "process_id",
            "master_replid",
        ]
    ),
    descriptor!(
        "slave_info",
        Gauge,
        "Information about the Redis slave",
        ["master_host", "master_port", "read_only"]
    ),
    descriptor!(
        "start_time_seconds",
        Gauge,
        "Start time of the Redis instance since unix epoch in seconds."
    ),
    descriptor!(
        "master_link_up",
        Gauge,
        "Master link status on Redis slave",
        ["master_host", "master_port"]
    ),
    descriptor!(
        "master_last_io_seconds_ago",
        Gauge,
        "Master last io seconds ago",
        ["master_host", "master_port"]
    ),
    descriptor!(
        "master_sync_in_progress",
        Gauge,
        "Master sync in progress",
        ["master_host", "master_port"]
    ),
    descriptor!(
        "slave_repl_offset",
        Gauge,
        "Slave replication offset",
        ["master_host", "master_port"]
    ),
    descriptor!(
        "connected_slave_lag_seconds",
        Gauge,
        "Lag of connected slave",
        ["slave_ip", "slave_port", "slave_state"]
    ),
    descriptor!(
        "connected_slave_offset_bytes",
        Gauge,
        "Offset of connected slave",
        ["slave_ip", "slave_port", "slave_state"]
    ),
    descriptor!(
        "commands_total",
        Counter,
        "Total number of calls per command",
        ["cmd"]
    ),
    descriptor!(
        "commands_duration_seconds_total",
        Counter,
        "Total amount of time in seconds spent per command",
        ["cmd"]
    ),
    descriptor!(
        "commands_rejected_calls_total",
        Counter,
        "Total number of errors within command execution per command",
        ["cmd"]
    ),
    descriptor!(
        "commands_failed_calls_total",
        Counter,
        "Total number of errors prior command execution per command",
        ["cmd"]
    ),
    descriptor!(
        "latency_percentiles_usec",
        Summary,
        "A summary of latency percentile distribution per command",
        ["cmd"]
    ),
    descriptor!(
        "errors_total",
        Counter,
        "Total number of errors per error type",
        ["err"]
    ),
    descriptor!("db_keys", Gauge, "Total number of keys by DB", ["db"]),
    descriptor!(
        "db_keys_expiring",
        Gauge,
        "Total number of expiring keys by DB",
        ["db"]
    ),
    descriptor!(
        "db_keys_cached",
        Gauge,
        "Total number of cached keys by DB",
        ["db"]
    ),
    descriptor!("db_avg_ttl_seconds", Gauge, "Avg TTL in seconds", ["db"]),
    descriptor!(
        "db_keys_subexpiry",
        Gauge,
        "Total number of keys with subkey expiry by DB",
        ["db"]
    ),

    // config
    descriptor!(
        "config_key_value",
        Gauge,
        "Config key and value",
        ["key", "value"]
    ),
    descriptor!(
        "config_value",
        Gauge,
        "Config key and value as metric",
        ["key"]
    ),
    descriptor!(
        "config_io_threads",
        Gauge,
        "The value of the io-threads configuration directive"
    ),
    descriptor!(
        "config_maxclients",
        Gauge,
        "The value of the maxclients configuration directive"
    ),
    descriptor!(
        "config_maxmemory",
        Gauge,
        "The value of the maxmemory configuration directive"
    ),
    descriptor!(
        "config_client_output_buffer_limit_bytes",
        Gauge,
        "The configured buffer limits per class",
        ["class", "limit"]
    ),
    descriptor!(
        "config_client_output_buffer_limit_overcome_seconds",
        Gauge,
        "How long for buffer limits per class to be exceeded before replicas are dropped",
        ["class", "limit"]
    ),

    // latency
    descriptor!(
        "latency_spike_last",
        Gauge,
        "When the latency spike last occurred",
        ["event_name"]
    ),
    descriptor!(
        "latency_spike_duration_seconds",
        Gauge,
        "Length of the last latency spike in seconds",
        ["event_name"]
    ),
    descriptor!(
        "commands_latencies_usec",
        Histogram,
        "A histogram of latencies per command",
        ["cmd"]
    ),

    // slowlog
    descriptor!("slowlog_length", Gauge, "Total slowlog"),
    descriptor!("slowlog_last_id", Gauge, "Last id of slowlog"),
    descriptor!(
        "last_slow_execution_duration_seconds",
        Gauge,
        "The amount of time needed for last slow execution, in seconds"
    ),

    // keys
    descriptor!(
        "key_size",
        Gauge,
        "The length or size of \"key\"",
        ["db", "key"]
    ),
    descriptor!("key_value", Gauge, "The value of \"key\"", ["db", "key"]),
    descriptor!(
        "key_value_as_string",
        Gauge,
        "The value of \"key\" as a string",
        ["db", "key", "val"]
    ),
    descriptor!(
        "key_memory_usage_bytes",
        Gauge,
        "The memory usage of \"key\" in bytes",
        ["db", "key"]
    ),
    descriptor!("keys_count", Gauge, "Count of keys", ["db", "key"]),

    // key groups
    descriptor!(
        "key_group_count",
        Gauge,
        "Count of keys in key group",
        ["db", "key_group"]
    ),
    descriptor!(
        "key_group_memory_usage_bytes",
        Gauge,
        "Total memory usage of key group in bytes",
        ["db", "key_group"]
    ),
    descriptor!(
        "number_of_distinct_key_groups",
        Gauge,
        "Number of distinct key groups",
        ["db"]
    ),
    descriptor!(
        "last_key_groups_scrape_duration_milliseconds",
        Gauge,
        "Duration of the last key group metrics scrape in milliseconds"
    ),

    // streams
    descriptor!(
        "stream_length",
        Gauge,
        "The number of elements of the stream",
        ["db", "stream"]
    ),
    descriptor!(
        "stream_radix_tree_keys",
        Gauge,
        "Radix tree keys count",
        ["db", "stream"]
    ),
    descriptor!(
        "stream_radix_tree_nodes",
        Gauge,
        "Radix tree nodes count",
        ["db", "stream"]
    ),
    descriptor!(
        "stream_groups",
        Gauge,
        "Groups count of stream",
        ["db", "stream"]
    ),
    descriptor!(
        "stream_last_generated_id",
        Gauge,
        "The epoch timestamp (ms) of the latest message on the stream",
        ["db", "stream"]
    ),
    descriptor!(
        "stream_first_entry_id",
        Gauge,
        "The epoch timestamp (ms) of the first message in the stream",
        ["db", "stream"]
    ),
    descriptor!(
        "stream_last_entry_id",
        Gauge,
        "The epoch timestamp (ms) of the last message in the stream",
        ["db", "stream"]
    ),
    descriptor!(
        "stream_max_deleted_entry_id",
        Gauge,
        "The epoch timestamp (ms) of last message was deleted from the stream",
        ["db", "stream"]
    ),
    descriptor!(
        "stream_group_consumers",
        Gauge,
        "Consumers count of stream group",
        ["db", "stream", "group"]
    ),
    descriptor!(
        "stream_group_messages_pending",
        Gauge,
        "Pending number of messages in that stream group",
        ["db", "stream", "group"]
    ),
    descriptor!(
        "stream_group_last_delivered_id",
        Gauge,
        "The epoch timestamp (ms) of the last delivered message",
        ["db", "stream", "group"]
    ),
    descriptor!(
        "stream_group_entries_read",
        Gauge,
        "Total number of entries read from the stream group",
        ["db", "stream", "group"]
    ),
    descriptor!(
        "stream_group_lag",
        Gauge,
        "The number of messages waiting to be delivered to the stream group's consumers",
        ["db", "stream", "group"]
    ),
    descriptor!(
        "stream_group_consumer_messages_pending",
        Gauge,
        "Pending number of messages for this specific consumer",
        ["db", "stream", "group", "consumer"]
    ),
    descriptor!(
        "stream_group_consumer_idle_seconds",
        Gauge,
        "Consumer idle time in seconds",
        ["db", "stream", "group", "consumer"]
    ),

    // sentinel
    descriptor!(
        "sentinel_masters",
        Gauge,
        "The number of masters this sentinel is watching"
    ),
    descriptor!("sentinel_tilt", Gauge, "Sentinel is in TILT mode"),
    descriptor!(
        "sentinel_running_scripts",
        Gauge,
        "Number of scripts in execution right now"
    ),
    descriptor!(
        "sentinel_scripts_queue_length",
        Gauge,
        "Queue of user scripts to execute"
    ),
    descriptor!(
        "sentinel_simulate_failure_flags",
        Gauge,
        "Failures simulations"
    ),
    descriptor!(
        "sentinel_master_status",
        Gauge,
        "Master status on Sentinel",
        ["master_name", "master_address", "master_status"]
    ),
    descriptor!(
        "sentinel_master_slaves",
        Gauge,
        "The number of slaves of the master",
        ["master_name", "master_address"]
    ),
    descriptor!(
        "sentinel_master_sentinels",
        Gauge,
        "The number of sentinels monitoring this master",
        ["master_name", "master_address"]
    ),
    descriptor!(
        "sentinel_master_ok_sentinels",
        Gauge,
        "The number of okay sentinels monitoring this master",
        ["master_name", "master_address"]
    ),
    descriptor!(
        "sentinel_master_ok_slaves",
        Gauge,
        "The number of okay slaves of the master",
        ["master_name", "master_address"]
    ),
    descriptor!(
        "sentinel_master_ckquorum_status",
        Gauge,
        "Master ckquorum status",
        ["master_name", "message"]
    ),
    descriptor!(
        "sentinel_master_setting_ckquorum",
        Gauge,
        "Show the current ckquorum config for each master",
        ["master_name", "master_address"]
    ),
    descriptor!(
        "sentinel_master_setting_failover_timeout",
        Gauge,
        "Show the current failover-timeout config for each master",
        ["master_name", "master_address"]
    ),
    descriptor!(
        "sentinel_master_setting_parallel_syncs",
        Gauge,
        "Show the current parallel-syncs config for each master",
        ["master_name", "master_address"]
    ),
    descriptor!(
        "sentinel_master_setting_down_after_milliseconds",
        Gauge,
        "Show the current down-after-milliseconds config for each master",
        ["master_name", "master_address"]
    ),

    // modules and scripts
    descriptor!(
        "module_info",
        Gauge,
        "Information about loaded Redis module",
        ["name", "ver", "api", "filters", "usedby", "using"]
    ),
    descriptor!(
        "script_values",
        Gauge,
        "Values returned by the collect script",
        ["key", "filename"]
    ),
    descriptor!(
        "script_result",
        Gauge,
        "Result of the collect script evaluation",
        ["filename"]
    ),
];

/// Immutable lookup tables, built once and shared by all scrapes.
#[derive(Debug)]
pub struct Registry {
    fields: HashMap<&'static str, Mapping>,
    descriptors: HashMap<&'static str, Descriptor>,
}

impl Registry {
    pub fn new(include_system_metrics: bool) -> Result<Self, Error> {
        let system: &[(&'static str, &'static str, &'static str)] = if include_system_metrics {
            SYSTEM_METRICS
        } else {
            &[]
        };
        let gauges = GAUGE_METRICS.iter().chain(system).copied().collect::<Vec<_>>();

        Self::build(&gauges, COUNTER_METRICS, TRANSFORMS, DESCRIPTORS)
    }

    fn build(
        gauges: &[(&'static str, &'static str, &'static str)],
        counters: &[(&'static str, &'static str, &'static str)],
        transforms: &[Transform],
        descriptors: &[Descriptor],
    ) -> Result<Self, Error> {
        let mut registry = Registry {
            fields: HashMap::with_capacity(gauges.len() + counters.len() + transforms.len()),
            descriptors: HashMap::with_capacity(
                gauges.len() + counters.len() + transforms.len() + descriptors.len(),
            ),
        };

        for (kind, table) in [(Kind::Gauge, gauges), (Kind::Counter, counters)] {
            for &(field, name, help) in table {
                registry.map(field, name, help, kind, 1.0)?;
            }
        }

        for transform in transforms {
            registry.map(
                transform.field,
                transform.name,
                transform.help,
                Kind::Gauge,
                transform.scale,
            )?;
        }

        for descriptor in descriptors {
            for (i, label) in descriptor.labels.iter().enumerate() {
                if descriptor.labels[..i].contains(label) {
                    return Err(Error::DuplicateLabel {
                        name: descriptor.name,
                        label: *label,
                    });
                }
            }

            if registry
                .descriptors
                .insert(descriptor.name, descriptor.clone())
                .is_some()
            {
                return Err(Error::Duplicate(descriptor.name));
            }
        }

        Ok(registry)
    }

    fn map(
        &mut self,
        field: &'static str,
        name: &'static str,
        help: &'static str,
        kind: Kind,
        scale: f64,
    ) -> Result<(), Error> {
        if self
            .fields
            .insert(field, Mapping { name, kind, scale })
            .is_some()
        {
            return Err(Error::Conflict(field));
        }

        let descriptor = Descriptor {
            name,
            help,
            kind,
            labels: &[],
        };
        if self.descriptors.insert(name, descriptor).is_some() {
            return Err(Error::Duplicate(name));
        }

        Ok(())
    }

    /// Resolve a field of the status report, unknown fields are `None`.
    #[inline]
    pub fn resolve(&self, field: &str) -> Option<Mapping> {
        self.fields.get(field).copied()
    }

    #[inline]
    pub fn descriptor(&self, name: &str) -> Option<&Descriptor> {
        self.descriptors.get(name)
    }

    /// All series families known ahead of time, sorted by name.
    pub fn descriptors(&self) -> Vec<&Descriptor> {
        let mut list = self.descriptors.values().collect::<Vec<_>>();
        list.sort_by_key(|d| d.name);
        list
    }
}

/// Convert the raw value of a field to a number, status words are mapped
/// to 0 and 1.
pub fn parse_value(value: &str) -> Option<f64> {
    match value {
        "ok" | "true" | "up" => Some(1.0),
        "err" | "fail" | "false" | "down" => Some(0.0),
        _ => value.parse::<f64>().ok(),
    }
}
