use crate::apdu::UnconfirmedServiceChoice;
use crate::constructed::{Element, Sequence, SequenceDecoder, SequenceEncoder};
use crate::services::UnconfirmedService;
use crate::types::{ObjectId, Segmentation, Unsigned};
use crate::{DecodeError, EncodeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IAmRequest {
    pub device_id: ObjectId,
    /// Max APDU length accepted, in octets.
    pub max_apdu: u32,
    pub segmentation: Segmentation,
    pub vendor_id: u16,
}

impl Sequence for IAmRequest {
    const ELEMENTS: &'static [Element] = &[
        Element::required("iAmDeviceIdentifier", None),
        Element::required("maxAPDULengthAccepted", None),
        Element::required("segmentationSupported", None),
        Element::required("vendorID", None),
    ];

    fn encode_elements(&self, enc: &mut SequenceEncoder<'_>) -> Result<(), EncodeError> {
        enc.element(&self.device_id)?;
        enc.element(&Unsigned(self.max_apdu))?;
        enc.element(&self.segmentation)?;
        enc.element(&Unsigned(u32::from(self.vendor_id)))
    }

    fn decode_elements(dec: &mut SequenceDecoder<'_>) -> Result<Self, DecodeError> {
        let device_id = dec.element::<ObjectId>()?;
        let max_apdu = dec.element::<Unsigned>()?.0;
        let segmentation = dec.element::<Segmentation>()?;
        let vendor_id =
            u16::try_from(dec.element::<Unsigned>()?.0).map_err(|_| DecodeError::InvalidValue)?;
        Ok(Self {
            device_id,
            max_apdu,
            segmentation,
            vendor_id,
        })
    }
}

crate::impl_sequence_datatype!(IAmRequest);

impl UnconfirmedService for IAmRequest {
    const CHOICE: UnconfirmedServiceChoice = UnconfirmedServiceChoice::IAm;
}
