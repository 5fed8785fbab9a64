/// One process of the cluster, addressable by name and hosting its own
/// function registry.
pub struct ClusterMember {
    name: String,
    registry: FunctionRegistry,
}

impl ClusterMember {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(GridError::ExecutionError(
                "member name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            name,
            registry: FunctionRegistry::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Registers a function on this member only.
    pub fn register_function(&self, function: Function) -> Result<()> {
        self.registry.register(function)
    }

    /// Runs a registered function on this member.
    pub fn execute(&self, function_id: &str, invocation: FunctionInvocation) -> Result<Option<Value>> {
        self.registry.execute(function_id, invocation)
    }

    pub fn invocation_count(&self, function_id: &str) -> Result<u64> {
        self.registry.invocation_count(function_id)
    }
}

impl std::fmt::Debug for ClusterMember {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterMember")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
