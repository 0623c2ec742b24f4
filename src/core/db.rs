use tracing::info;
use uuid::Uuid;

use crate::core::errors::ApiResult;
use crate::core::helpers::{hash_password, now_iso, today};
use crate::core::store::{Document, Repository};
use crate::models::models::{Post, PostBoard, User, Users};

const DEMO_USERS: [(&str, &str); 3] = [
    ("alice", "Hello, I'm Alice!"),
    ("bob", "Bob's corner of the internet"),
    ("carol", "Just looking around"),
];

fn demo_post(username: &str, message: &str) -> Post {
    Post {
        id: Uuid::new_v4().to_string(),
        username: username.to_string(),
        message: message.to_string(),
        image: None,
        likes: Vec::new(),
        comments: Vec::new(),
        created_at: now_iso(),
    }
}

/// Creates the demo accounts (password = username) if they are missing:
/// alice and bob are friends, carol has a pending request to alice.
pub fn init_test_data(repo: &Repository) -> ApiResult<()> {
    let mut hashes = Vec::with_capacity(DEMO_USERS.len());
    for (name, _) in DEMO_USERS {
        hashes.push(hash_password(name)?);
    }

    repo.transaction(&[Document::Users, Document::Posts], |tx| {
        let mut users: Users = tx.load(Document::Users)?;
        if DEMO_USERS.iter().all(|(name, _)| users.contains_key(*name)) {
            return Ok(()); // Already initialized
        }

        let mut board: PostBoard = tx.load(Document::Posts)?;
        if board.day.is_empty() {
            board.day = today();
        }

        for ((name, bio), hash) in DEMO_USERS.iter().zip(hashes) {
            if users.contains_key(*name) {
                continue;
            }
            let mut user = User::new(name.to_string(), hash, now_iso());
            user.bio = Some(bio.to_string());
            users.insert(name.to_string(), user);
            board.posts.push(demo_post(name, &format!("{bio} First post here.")));
        }

        if let Some(alice) = users.get_mut("alice") {
            if !alice.is_friend("bob") {
                alice.friends.push("bob".to_string());
            }
            if !alice.has_request_from("carol") && !alice.is_friend("carol") {
                alice.pending_requests.push("carol".to_string());
            }
        }
        if let Some(bob) = users.get_mut("bob") {
            if !bob.is_friend("alice") {
                bob.friends.push("alice".to_string());
            }
        }

        tx.stage(Document::Users, &users)?;
        tx.stage(Document::Posts, &board)?;
        info!("demo data seeded");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::FileStore;

    #[test]
    fn seeding_is_idempotent_and_symmetric() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::new(FileStore::open(dir.path()).unwrap());

        init_test_data(&repo).unwrap();
        init_test_data(&repo).unwrap();

        let users: Users = repo.read(Document::Users).unwrap();
        assert_eq!(users.len(), 3);
        assert!(users["alice"].is_friend("bob") && users["bob"].is_friend("alice"));
        assert_eq!(users["alice"].pending_requests, vec!["carol".to_string()]);

        let board: PostBoard = repo.read(Document::Posts).unwrap();
        assert_eq!(board.posts.len(), 3);
    }
}
