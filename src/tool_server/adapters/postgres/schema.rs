//! Diesel schema for tool server persistence.

diesel::table! {
    /// Configured tool servers.
    tool_servers (id) {
        /// Server identifier.
        id -> Uuid,
        /// Display name.
        #[max_length = 100]
        name -> Varchar,
        /// Catalog template the server was installed from, unique when set.
        #[max_length = 100]
        template_id -> Nullable<Varchar>,
        /// Transport configuration as JSONB.
        transport -> Jsonb,
        /// Whether the server starts with the manager.
        enabled -> Bool,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Last discovered tool catalog per server.
    tool_schemas (server_id) {
        /// Owning server.
        server_id -> Uuid,
        /// Tool descriptors as a JSONB array.
        tools -> Jsonb,
        /// When the catalog was stored.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Append-only invocation audit log.
    tool_invocations (id) {
        /// Record identifier.
        id -> Uuid,
        /// Target server.
        server_id -> Uuid,
        /// Requested tool.
        tool_name -> Text,
        /// SHA-256 hex digest of the canonical arguments.
        #[max_length = 64]
        argument_digest -> Varchar,
        /// Truncated argument rendering.
        arguments_preview -> Text,
        /// Truncated result rendering.
        result_preview -> Nullable<Text>,
        /// Failure category, null on success.
        #[max_length = 50]
        failure_kind -> Nullable<Varchar>,
        /// Failure summary, null on success.
        failure_summary -> Nullable<Text>,
        /// Call duration in milliseconds.
        duration_ms -> Int8,
        /// Dispatch timestamp.
        started_at -> Timestamptz,
    }
}

diesel::joinable!(tool_schemas -> tool_servers (server_id));
diesel::allow_tables_to_appear_in_same_query!(tool_servers, tool_schemas, tool_invocations);
