//! Path lookup and folder tree navigation

use vellum_authorization::Action;
use vellum_core::{ObjectId, PrincipalId, Result, VellumError};
use vellum_types::BaseType;

use super::objects::object_name;
use super::{ObjectData, ReadOptions, Repository};
use crate::object::ObjectTable;

/// An object with the objects filed below it
#[derive(Debug, Clone)]
pub struct ObjectTree {
    /// The object itself
    pub object: ObjectData,
    /// Its children, empty for non-folders and at the depth limit
    pub children: Vec<ObjectTree>,
}

/// A folder an object is filed in
#[derive(Debug, Clone)]
pub struct ObjectParent {
    /// The parent folder
    pub folder: ObjectData,
    /// Name of the object inside that folder
    pub relative_path_segment: String,
}

impl Repository {
    /// Read the object at an absolute path of names below the root folder
    pub fn get_object_by_path(
        &self,
        path: &str,
        options: &ReadOptions,
        user: &PrincipalId,
    ) -> Result<ObjectData> {
        let Some(relative) = path.strip_prefix('/') else {
            return Err(VellumError::invalid_message(format!("path '{path}' is not absolute")));
        };
        let table = self.state.read();
        let mut current = self.root_id.clone();
        for segment in relative.split('/').filter(|segment| !segment.is_empty()) {
            let next = table
                .children(&current)
                .find(|child| object_name(child) == segment)
                .map(|child| child.id.clone())
                .ok_or_else(|| VellumError::object_not_found(path))?;
            current = next;
        }
        self.object_data(&table, &current, options, user)
    }

    /// Objects below `folder_id`, `depth` levels deep or all levels for `None`
    ///
    /// Each level is sorted by name. Objects the caller may not read are left
    /// out with everything below them.
    pub fn get_descendants(
        &self,
        folder_id: &ObjectId,
        depth: Option<usize>,
        options: &ReadOptions,
        user: &PrincipalId,
    ) -> Result<Vec<ObjectTree>> {
        self.descendants(folder_id, depth, false, options, user)
    }

    /// Like [`Repository::get_descendants`] restricted to folders
    pub fn get_folder_tree(
        &self,
        folder_id: &ObjectId,
        depth: Option<usize>,
        options: &ReadOptions,
        user: &PrincipalId,
    ) -> Result<Vec<ObjectTree>> {
        self.descendants(folder_id, depth, true, options, user)
    }

    fn descendants(
        &self,
        folder_id: &ObjectId,
        depth: Option<usize>,
        folders_only: bool,
        options: &ReadOptions,
        user: &PrincipalId,
    ) -> Result<Vec<ObjectTree>> {
        if depth == Some(0) {
            return Err(VellumError::invalid_message("depth must be at least 1"));
        }
        let table = self.state.read();
        self.authorize(&table, folder_id, user, Action::GetDescendantsFolder)?;
        let folder = table.get(folder_id)?;
        if folder.base_type() != BaseType::Folder {
            return Err(VellumError::invalid_message(format!("'{folder_id}' is not a folder")));
        }
        let trees = self.subtree(&table, &folder.id, depth, folders_only, options, user)?;
        tracing::trace!(folder = %folder_id, roots = trees.len(), "Read descendants");
        Ok(trees)
    }

    fn subtree(
        &self,
        table: &ObjectTable,
        folder: &ObjectId,
        depth: Option<usize>,
        folders_only: bool,
        options: &ReadOptions,
        user: &PrincipalId,
    ) -> Result<Vec<ObjectTree>> {
        let mut trees = Vec::new();
        for (key, object) in self.readable_children(table, folder, options, user)? {
            let is_folder = object.base_type == BaseType::Folder;
            if folders_only && !is_folder {
                continue;
            }
            let children = match depth {
                Some(1) => Vec::new(),
                _ if is_folder => self.subtree(
                    table,
                    &key,
                    depth.map(|levels| levels - 1),
                    folders_only,
                    options,
                    user,
                )?,
                _ => Vec::new(),
            };
            trees.push(ObjectTree { object, children });
        }
        Ok(trees)
    }

    /// Parent of a folder
    pub fn get_folder_parent(
        &self,
        folder_id: &ObjectId,
        options: &ReadOptions,
        user: &PrincipalId,
    ) -> Result<ObjectData> {
        let table = self.state.read();
        self.authorize(&table, folder_id, user, Action::GetFolderParentObject)?;
        let folder = table.get(folder_id)?;
        if folder.base_type() != BaseType::Folder {
            return Err(VellumError::invalid_message(format!("'{folder_id}' is not a folder")));
        }
        let parent = folder
            .parent
            .clone()
            .ok_or_else(|| VellumError::invalid_message("the root folder has no parent"))?;
        self.object_data(&table, &parent, options, user)
    }

    /// Folders `id` is filed in, with its name in each
    ///
    /// Unfiled objects have no parents.
    pub fn get_object_parents(
        &self,
        id: &ObjectId,
        options: &ReadOptions,
        user: &PrincipalId,
    ) -> Result<Vec<ObjectParent>> {
        let table = self.state.read();
        self.authorize(&table, id, user, Action::GetParentsFolder)?;
        let object = table.get(id)?;
        if object.id == self.root_id {
            return Err(VellumError::invalid_message("the root folder has no parent"));
        }
        let Some(parent) = &object.parent else {
            return Ok(Vec::new());
        };
        Ok(vec![ObjectParent {
            folder: self.object_data(&table, parent, options, user)?,
            relative_path_segment: object_name(object),
        }])
    }
}
