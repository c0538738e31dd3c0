use std::collections::HashMap;

use crate::error::{Error, Result};

/// A named collection of resource sets. Destroying a client destroys
/// every set it owns (handled by the manager, which owns both registries).
#[derive(Debug, Clone)]
pub struct Client {
    pub id: u32,
    pub name: String,
    pub rsets: Vec<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: HashMap<u32, Client>,
    next_id: u32,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, name: &str) -> Result<u32> {
        if self.find_by_name(name).is_some() {
            return Err(Error::Exists(format!("client '{}'", name)));
        }

        self.next_id += 1;
        let id = self.next_id;
        self.clients.insert(id, Client { id, name: name.to_string(), rsets: Vec::new() });

        Ok(id)
    }

    pub fn remove(&mut self, id: u32) -> Option<Client> {
        self.clients.remove(&id)
    }

    pub fn get(&self, id: u32) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Client> {
        self.clients.values().find(|c| c.name == name)
    }

    pub fn attach_rset(&mut self, client: u32, rset: u32) -> Result<()> {
        let client = self
            .clients
            .get_mut(&client)
            .ok_or_else(|| Error::NotFound("client".to_string()))?;
        client.rsets.push(rset);
        Ok(())
    }

    pub fn detach_rset(&mut self, client: u32, rset: u32) {
        if let Some(client) = self.clients.get_mut(&client) {
            client.rsets.retain(|&r| r != rset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_and_sets_attach() {
        let mut registry = ClientRegistry::new();
        let id = registry.create("media-player").unwrap();
        assert!(registry.create("media-player").is_err());

        registry.attach_rset(id, 1).unwrap();
        registry.attach_rset(id, 2).unwrap();
        registry.detach_rset(id, 1);
        assert_eq!(registry.get(id).unwrap().rsets, vec![2]);
    }
}
