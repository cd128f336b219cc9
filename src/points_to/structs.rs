use crate::ir::{Module, StructId, Type};

/// Expanded layout of one struct type, following the field-sensitive
/// expansion of Pearce et al.: nested structs are flattened, arrays count
/// as a single element of their element type.
#[derive(Debug, Default, Clone)]
pub struct StructInfo {
    /// Original field index -> position in the expanded layout.
    offset_map: Vec<usize>,
    /// Per expanded field: did it come from an array?
    array_flags: Vec<bool>,
    /// Per expanded field: is it a scalar pointer?
    pointer_flags: Vec<bool>,
}

impl StructInfo {
    /// Number of fields in the original declaration.
    #[inline]
    pub fn size(&self) -> usize {
        self.offset_map.len()
    }

    /// Number of scalar fields after flattening.
    #[inline]
    pub fn expanded_size(&self) -> usize {
        self.array_flags.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.expanded_size() == 0
    }

    /// Expanded position of original field `j`.
    #[inline]
    pub fn offset(&self, j: usize) -> usize {
        self.offset_map[j]
    }

    #[inline]
    pub fn is_field_array(&self, field: usize) -> bool {
        self.array_flags[field]
    }

    #[inline]
    pub fn is_field_pointer(&self, field: usize) -> bool {
        self.pointer_flags[field]
    }
}

/// Precomputed expansion info for every struct type of a module. Consulted
/// while sizing object runs and translating field indices; not used after
/// constraint collection.
pub struct StructOracle {
    infos: Vec<StructInfo>,
}

impl StructOracle {
    pub fn build(module: &Module) -> StructOracle {
        let mut infos: Vec<Option<StructInfo>> = vec![None; module.structs.len()];
        let mut visiting = vec![false; module.structs.len()];
        for i in 0..module.structs.len() {
            compute_info(module, StructId(i as u32), &mut infos, &mut visiting);
        }
        StructOracle {
            infos: infos.into_iter().map(Option::unwrap).collect(),
        }
    }

    #[inline]
    pub fn info(&self, id: StructId) -> &StructInfo {
        &self.infos[id.0 as usize]
    }

    /// Number of scalar fields a value of `ty` flattens to.
    pub fn expanded_size_of(&self, ty: &Type) -> usize {
        match ty {
            Type::Struct(id) => self.info(*id).expanded_size(),
            Type::Array(elem, _) => self.expanded_size_of(elem),
            Type::Int | Type::Ptr(_) => 1,
        }
    }
}

fn compute_info(
    module: &Module,
    id: StructId,
    infos: &mut Vec<Option<StructInfo>>,
    visiting: &mut Vec<bool>,
) {
    if infos[id.0 as usize].is_some() {
        return;
    }
    assert!(
        !visiting[id.0 as usize],
        "struct {} contains itself by value",
        module.struct_def(id).name
    );
    visiting[id.0 as usize] = true;

    let mut info = StructInfo::default();
    let mut num_field = 0usize;
    for field_ty in &module.struct_def(id).fields {
        let mut sub_ty = field_ty;
        let mut is_array = false;
        while let Type::Array(elem, _) = sub_ty {
            is_array = true;
            sub_ty = elem.as_ref();
        }

        info.offset_map.push(num_field);
        if let Type::Struct(sub_id) = sub_ty {
            compute_info(module, *sub_id, infos, visiting);
            let sub_info = infos[sub_id.0 as usize].as_ref().unwrap();
            info.array_flags.extend(&sub_info.array_flags);
            info.pointer_flags.extend(&sub_info.pointer_flags);
            num_field += sub_info.expanded_size();
        } else {
            info.array_flags.push(is_array);
            info.pointer_flags.push(sub_ty.is_pointer());
            num_field += 1;
        }
    }

    visiting[id.0 as usize] = false;
    infos[id.0 as usize] = Some(info);
}
